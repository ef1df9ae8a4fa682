//! Copies resolved (computed) styles from a live subtree onto its clone, so the clone renders
//! the same once detached from the editor's cascade.

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;

use crate::element::RemoteNode;
use crate::transport::DEFAULT_TIMEOUT;

/// Computed properties copied onto every cloned element, kebab-case.
///
/// Empirically curated: extend it when a new visual effect shows up in exports.
pub const CRITICAL_PROPERTIES: &[&str] = &[
    // layout & box model
    "display",
    "position",
    "top",
    "right",
    "bottom",
    "left",
    "width",
    "height",
    "min-width",
    "min-height",
    "max-width",
    "max-height",
    "margin",
    "margin-top",
    "margin-right",
    "margin-bottom",
    "margin-left",
    "padding",
    "padding-top",
    "padding-right",
    "padding-bottom",
    "padding-left",
    "box-sizing",
    "overflow",
    "overflow-x",
    "overflow-y",
    // flexbox & grid
    "flex-direction",
    "flex-wrap",
    "justify-content",
    "align-items",
    "align-content",
    "align-self",
    "flex",
    "flex-grow",
    "flex-shrink",
    "flex-basis",
    "order",
    "gap",
    "grid-template-columns",
    "grid-template-rows",
    "grid-column",
    "grid-row",
    // typography
    "font-family",
    "font-size",
    "font-weight",
    "font-style",
    "line-height",
    "text-align",
    "text-transform",
    "letter-spacing",
    "word-spacing",
    "white-space",
    "word-break",
    "overflow-wrap",
    "text-decoration",
    // colors & backgrounds
    "color",
    "background-color",
    "background-image",
    "background-position",
    "background-size",
    "background-repeat",
    "background-clip",
    "background-origin",
    // borders & shadows
    "border",
    "border-width",
    "border-style",
    "border-color",
    "border-radius",
    "border-top-left-radius",
    "border-top-right-radius",
    "border-bottom-left-radius",
    "border-bottom-right-radius",
    "box-shadow",
    "outline",
    // transforms & effects
    "transform",
    "transform-origin",
    "transform-style",
    "opacity",
    "visibility",
    "z-index",
    // clipping
    "clip-path",
    "clip",
    // svg & filters
    "fill",
    "stroke",
    "filter",
];

/// Computed values that are left alone: writing them explicitly changes nothing but can mask
/// shorthand/longhand interactions.
pub const SKIPPED_VALUES: &[&str] = &["none", "auto", "normal"];

/// Page function: `inlineComputedStyles(source, target, config)`.
///
/// `config` is `{ properties, skip, copyAbsolutePositions }`; returns `{ styled, mismatches }`.
pub(crate) const INLINE_FN: &str = r#"
function inlineComputedStyles(source, target, config) {
  const report = { styled: 0, mismatches: 0 };
  const walk = (src, dst) => {
    const style = getComputedStyle(src);
    for (const prop of config.properties) {
      let value = style.getPropertyValue(prop);
      if (!value || config.skip.includes(value.trim())) continue;
      if (prop === "transform") {
        // computed transforms are already resolved to matrix()/matrix3d()
        const matrix = style.transform;
        if (matrix && matrix !== "none") value = matrix;
      }
      // clip-path url()/polygon()/inset() values are copied verbatim
      dst.style.setProperty(prop, value, "important");
    }
    if (config.copyAbsolutePositions &&
        (style.position === "absolute" || style.position === "fixed") &&
        src.parentElement) {
      const rect = src.getBoundingClientRect();
      const parent = src.parentElement.getBoundingClientRect();
      dst.style.setProperty("left", `${rect.left - parent.left}px`, "important");
      dst.style.setProperty("top", `${rect.top - parent.top}px`, "important");
      dst.style.setProperty("width", `${rect.width}px`, "important");
      dst.style.setProperty("height", `${rect.height}px`, "important");
    }
    report.styled += 1;
    const a = src.children, b = dst.children;
    if (a.length !== b.length) report.mismatches += 1;
    for (let i = 0; i < a.length && i < b.length; i++) {
      if (a[i] instanceof Element && b[i] instanceof Element) walk(a[i], b[i]);
    }
  };
  walk(source, target);
  return report;
}
"#;

/// Outcome of one inlining pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct InlineReport {
    /// Elements whose styles were copied.
    pub styled: u32,
    /// Element pairs whose child counts differed; the extra children were left unstyled.
    pub mismatches: u32,
}

/// Style Inliner configuration.
#[derive(Debug, Clone, Default)]
pub struct StyleInliner {
    copy_absolute_positions: bool,
}

impl StyleInliner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies live pixel geometry onto absolute/fixed descendants instead of relying on layout.
    ///
    /// Brittle across rendering hosts; enable only for elements whose layout-based
    /// positioning is known to fail.
    pub fn with_absolute_positions(mut self, enabled: bool) -> Self {
        self.copy_absolute_positions = enabled;
        self
    }

    pub(crate) fn config(&self) -> serde_json::Value {
        json!({
            "properties": CRITICAL_PROPERTIES,
            "skip": SKIPPED_VALUES,
            "copyAbsolutePositions": self.copy_absolute_positions,
        })
    }

    /// Inlines `source`'s computed styles onto `clone`, pairing children by index.
    pub(crate) async fn inline(
        &self,
        source: &RemoteNode<'_>,
        clone: &RemoteNode<'_>,
    ) -> Result<InlineReport> {
        let declaration = format!(
            "function(target, config) {{ {INLINE_FN}\nreturn inlineComputedStyles(this, target, config); }}"
        );
        let value = source
            .call(
                &declaration,
                &[clone.as_arg(), self.config().into()],
                DEFAULT_TIMEOUT,
            )
            .await?;
        let report: InlineReport = serde_json::from_value(value)?;
        if report.mismatches > 0 {
            log::warn!(
                "clone structure differs from source at {} element(s); extra children keep their stylesheet styles",
                report.mismatches
            );
        }
        log::debug!("inlined styles on {} element(s)", report.styled);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_table_is_kebab_case_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for prop in CRITICAL_PROPERTIES {
            assert!(
                prop.chars().all(|c| c.is_ascii_lowercase() || c == '-'),
                "{prop}"
            );
            assert!(seen.insert(*prop), "duplicate {prop}");
        }
        assert!(CRITICAL_PROPERTIES.len() >= 60);
    }

    #[test]
    fn config_carries_tables() {
        let config = StyleInliner::new().with_absolute_positions(true).config();
        assert_eq!(config["copyAbsolutePositions"], true);
        assert_eq!(
            config["properties"].as_array().unwrap().len(),
            CRITICAL_PROPERTIES.len()
        );
        assert_eq!(config["skip"], json!(["none", "auto", "normal"]));
    }

    #[tokio::test]
    #[ignore = "requires a local Chrome"]
    async fn second_pass_changes_nothing() {
        let browser = crate::Browser::new().await.unwrap();
        let tab = browser.new_tab().await.unwrap();
        tab.set_content(
            r#"<style>.card{display:flex;gap:8px;padding:12px;color:rgb(1,2,3);transform:rotate(5deg)}</style>
               <div id="card" class="card"><b>a</b><i>b</i></div>"#,
        )
        .await
        .unwrap();
        let element = tab.find_element("#card").await.unwrap();
        let source = element.resolve().await.unwrap();
        let clone = source
            .call_for_node("function() { return this.cloneNode(true); }", &[])
            .await
            .unwrap();
        let inline_styles = "function() { return [this, ...this.querySelectorAll('*')].map((n) => n.getAttribute('style')); }";

        let inliner = StyleInliner::new();
        let first = inliner.inline(&source, &clone).await.unwrap();
        let after_first = clone.call(inline_styles, &[], DEFAULT_TIMEOUT).await.unwrap();
        let second = inliner.inline(&source, &clone).await.unwrap();
        let after_second = clone.call(inline_styles, &[], DEFAULT_TIMEOUT).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.styled, 3);
        assert_eq!(after_first, after_second);
        assert!(after_first[0].as_str().unwrap().contains("matrix("));

        browser.close_async().await.unwrap();
    }
}
