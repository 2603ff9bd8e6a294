//! Prompt assembly for the code-writing agents

const INTRO: &str = "You are a programmer writing UI components.";

const RULES: &str = "## Rules

- The code you are given is a UI component; an exported `__PREVIEW__` is the previewable entry
- If you are given a reason for a test failure, modify the code to pass that test
- Output only the code in a single fenced block. Explain intent with comments inside the code
- Write comments in the same language as the request
- Do not omit existing code in the output; it replaces the user's file as is";

const OUTPUT_EXAMPLE: &str = "## Output Example

```tsx
export default function Button() {
  return <button>Hello</button>;
}
```";

pub fn fix_system_prompt() -> String {
    format!("{}\nFix the code according to the request.\n\n{}\n\n{}\n", INTRO, RULES, OUTPUT_EXAMPLE)
}

pub fn generate_system_prompt() -> String {
    format!("{}\nWrite new code according to the request.\n\n{}\n\n{}\n", INTRO, RULES, OUTPUT_EXAMPLE)
}

fn fenced(lang: &str, code: &str) -> String {
    format!("```{}\n{}\n```", lang, code.trim_end())
}

/// First attempt at changing `code`
pub fn build_fix_prompt(lang: &str, code: &str, request: &str, test: Option<&str>) -> String {
    let mut out = format!("## Code\n\n{}\n\n", fenced(lang, code));
    if let Some(test) = test.filter(|t| !t.trim().is_empty()) {
        out.push_str(&format!("## Test\n\n{}\n\n", fenced(lang, test)));
    }
    out.push_str(&format!("## Request\n\n{}\n", request));
    out
}

/// Follow-up after `failed_code` did not pass
pub fn build_retry_prompt(
    lang: &str,
    failed_code: &str,
    request: &str,
    test: Option<&str>,
    reason: &str,
) -> String {
    let mut out = build_fix_prompt(lang, failed_code, request, test);
    out.push_str(&format!(
        "\n## Failed Reason\n\n{}\n\nModify the code so that it passes.\n",
        reason.trim()
    ));
    out
}

/// Request for a file that does not exist yet
pub fn build_generate_prompt(file_name: &str, request: &str) -> String {
    format!("## Request\n\n{}\n\nWrite the new code for {}.\n", request, file_name)
}
