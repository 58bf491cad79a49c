//! Preview iframe document generation.
//!
//! The iframe document embeds the compiled CSS inline and hands the
//! browser bundle to the page through a same-origin blob URL. The bundle is
//! arbitrary user code, so its text never touches the HTML parser: it is
//! embedded as a JS string literal with `<` escaped, turned into a Blob,
//! and loaded as a module script.

use crate::css::CompiledCss;

/// Iframe document template; `{css}` and `{script_literal}` substituted.
const IFRAME_TEMPLATE: &str = include_str!("embed/iframe.html");

/// Build the self-contained preview document for one story.
///
/// CSS entries are concatenated in order; the cascade depends on it.
pub fn iframe_document(css: &[CompiledCss], bundle: &str) -> String {
    let css_text = css
        .iter()
        .map(|c| c.output.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    IFRAME_TEMPLATE
        .replace("{css}", &css_text)
        .replace("{script_literal}", &script_literal(bundle))
}

/// Encode arbitrary script text as a JS string literal safe to embed in an
/// HTML `<script>` element.
///
/// JSON string encoding covers quotes, backslashes and control characters;
/// escaping `<` on top of that keeps `</script>` and `<!--` sequences from
/// terminating the surrounding element.
fn script_literal(script: &str) -> String {
    serde_json::to_string(script)
        .unwrap_or_else(|_| String::from("\"\""))
        .replace('<', "\\u003c")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn css(output: &str) -> CompiledCss {
        CompiledCss {
            paths: vec![],
            output: output.to_owned(),
        }
    }

    #[test]
    fn test_script_literal_escapes_closing_tag() {
        let literal = script_literal("console.log('</script>')");
        assert!(!literal.contains("</script>"));
        assert!(literal.contains("\\u003c/script>"));
    }

    #[test]
    fn test_script_literal_is_valid_json_string() {
        let literal = script_literal("a \"quoted\" \\ thing\nline two");
        let decoded: String = serde_json::from_str(&literal).unwrap();
        assert_eq!(decoded, "a \"quoted\" \\ thing\nline two");
    }

    #[test]
    fn test_css_concatenation_preserves_order() {
        let doc = iframe_document(&[css(".a{}"), css(".b{}")], "export {};");
        let a = doc.find(".a{}").unwrap();
        let b = doc.find(".b{}").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_document_embeds_blob_loader() {
        let doc = iframe_document(&[], "export {};");
        assert!(doc.contains("URL.createObjectURL"));
        assert!(doc.contains("id=\"root\""));
        assert!(doc.contains("/__hmr"));
    }
}
