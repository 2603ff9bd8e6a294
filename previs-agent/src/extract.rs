//! Pull code out of a model answer

use regex::Regex;
use std::sync::OnceLock;

/// Compiled once; `None` only if the pattern itself is broken
fn fence() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```([A-Za-z0-9_+\-]*)[^\n]*\n(.*?)```").ok())
        .as_ref()
}

/// First fenced block tagged `lang`, else the first fenced block of any
/// language. Returns the trimmed body, or `None` when there is no usable block.
pub fn extract_code_block(text: &str, lang: &str) -> Option<String> {
    let blocks: Vec<(&str, &str)> = fence()?
        .captures_iter(text)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect();

    blocks
        .iter()
        .find(|(tag, _)| tag.eq_ignore_ascii_case(lang))
        .or_else(|| blocks.first())
        .map(|(_, body)| body.trim().to_string())
        .filter(|body| !body.is_empty())
}

/// Language tag for a file, from its extension
pub fn lang_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tsx") => "tsx",
        Some("ts") | Some("mts") => "ts",
        Some("jsx") => "jsx",
        Some("js") | Some("mjs") => "js",
        Some("svelte") => "svelte",
        Some("vue") => "vue",
        Some("css") => "css",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_extracts_tagged_block() {
        let text = "Here you go:\n```tsx\nconst x = 1;\n```\nDone.";
        assert_eq!(extract_code_block(text, "tsx").as_deref(), Some("const x = 1;"));
    }

    #[test]
    fn test_prefers_requested_language() {
        let text = "```bash\nnpm i\n```\n\n```tsx\nexport default function A() {}\n```";
        assert_eq!(
            extract_code_block(text, "tsx").as_deref(),
            Some("export default function A() {}")
        );
    }

    #[test]
    fn test_falls_back_to_any_block() {
        let text = "```\nlet y = 2;\n```";
        assert_eq!(extract_code_block(text, "tsx").as_deref(), Some("let y = 2;"));
    }

    #[test]
    fn test_no_block() {
        assert_eq!(extract_code_block("just prose", "tsx"), None);
        assert_eq!(extract_code_block("```tsx\n\n```", "tsx"), None);
        // unterminated fence
        assert_eq!(extract_code_block("```tsx\nconst a = 1;", "tsx"), None);
    }

    #[test]
    fn test_lang_for() {
        assert_eq!(lang_for(Path::new("button.tsx")), "tsx");
        assert_eq!(lang_for(Path::new("sum.test.ts")), "ts");
        assert_eq!(lang_for(Path::new("Makefile")), "");
    }
}
