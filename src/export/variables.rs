//! Re-resolves custom-property driven paint values into literals.
//!
//! Once the clone moves into the export host it leaves the editor's cascade, so any
//! `var(--x)` defined on an ancestor of the live element stops resolving. The values are read
//! from the live element, where the ancestors still apply, and written onto the clone with
//! `important` priority.

use anyhow::Result;
use serde_json::json;

use crate::element::RemoteNode;
use crate::transport::DEFAULT_TIMEOUT;

/// Color-bearing properties re-resolved on every element.
pub const COLOR_PROPERTIES: &[&str] = &[
    "background-color",
    "color",
    "border-color",
    "border-top-color",
    "border-right-color",
    "border-bottom-color",
    "border-left-color",
    "outline-color",
    "text-decoration-color",
    "fill",
    "stroke",
    "caret-color",
    "column-rule-color",
];

/// Non-color properties that commonly carry variables (gradients, shadows).
pub const PAINT_PROPERTIES: &[&str] = &["background-image", "box-shadow", "text-shadow"];

/// Values never written back.
pub const EMPTY_PAINT: &[&str] = &["transparent", "rgba(0, 0, 0, 0)", "none"];

/// Page function: `resolveCssVariables(source, target, config)`.
///
/// Reads resolved values from the live `source` subtree, where every custom property of the
/// editor's cascade is still in scope, and writes them onto the `target` clone. Children are
/// paired by index like the Style Inliner does. Returns the number of elements written.
pub(crate) const RESOLVE_FN: &str = r#"
function resolveCssVariables(source, target, config) {
  let visited = 0;
  const walk = (src, dst) => {
    const style = getComputedStyle(src);
    for (const prop of config.colors) {
      const value = style.getPropertyValue(prop);
      if (value && !config.empty.includes(value)) dst.style.setProperty(prop, value, "important");
    }
    for (const prop of config.paint) {
      const value = style.getPropertyValue(prop);
      if (value && value !== "none") dst.style.setProperty(prop, value, "important");
    }
    visited += 1;
    const a = src.children, b = dst.children;
    for (let i = 0; i < a.length && i < b.length; i++) walk(a[i], b[i]);
  };
  walk(source, target);
  return visited;
}
"#;

pub(crate) fn config() -> serde_json::Value {
    json!({
        "colors": COLOR_PROPERTIES,
        "paint": PAINT_PROPERTIES,
        "empty": EMPTY_PAINT,
    })
}

/// Writes the paint literals resolved on `source` onto `clone` and its descendants.
pub(crate) async fn resolve_variables(
    source: &RemoteNode<'_>,
    clone: &RemoteNode<'_>,
) -> Result<u32> {
    let declaration = format!(
        "function(target, config) {{ {RESOLVE_FN}\nreturn resolveCssVariables(this, target, config); }}"
    );
    let visited = source
        .call(&declaration, &[clone.as_arg(), config().into()], DEFAULT_TIMEOUT)
        .await?;
    Ok(visited.as_u64().unwrap_or(0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_border_side_is_covered() {
        for side in ["top", "right", "bottom", "left"] {
            let prop = format!("border-{side}-color");
            assert!(COLOR_PROPERTIES.contains(&prop.as_str()), "{prop}");
        }
    }

    #[test]
    fn transparent_forms_are_skipped() {
        let config = config();
        let empty = config["empty"].as_array().unwrap();
        assert!(empty.contains(&json!("transparent")));
        assert!(empty.contains(&json!("rgba(0, 0, 0, 0)")));
        assert_eq!(config["paint"], json!(["background-image", "box-shadow", "text-shadow"]));
    }

    #[tokio::test]
    #[ignore = "requires a local Chrome"]
    async fn ancestor_variables_survive_reparenting() {
        let browser = crate::Browser::new().await.unwrap();
        let tab = browser.new_tab().await.unwrap();
        tab.set_content(
            r#"<style>
                 .theme-dark { --glow: rgb(255, 0, 0) 0px 0px 4px; --rule: rgb(0, 128, 0); }
                 .card { text-shadow: var(--glow); column-rule-color: var(--rule); }
               </style>
               <div class="theme-dark"><div id="card" class="card"><p>hi</p></div></div>"#,
        )
        .await
        .unwrap();
        let element = tab.find_element("#card").await.unwrap();
        let source = element.resolve().await.unwrap();
        let clone = source
            .call_for_node(
                "function() { const c = this.cloneNode(true); document.body.appendChild(c); return c; }",
                &[],
            )
            .await
            .unwrap();

        let visited = resolve_variables(&source, &clone).await.unwrap();
        assert_eq!(visited, 2);

        let styles = clone
            .call(
                "function() { return [this.style.textShadow, this.style.columnRuleColor]; }",
                &[],
                DEFAULT_TIMEOUT,
            )
            .await
            .unwrap();
        assert!(styles[0].as_str().unwrap().contains("rgb(255, 0, 0)"), "{styles}");
        assert_eq!(styles[1], "rgb(0, 128, 0)");

        browser.close_async().await.unwrap();
    }
}
