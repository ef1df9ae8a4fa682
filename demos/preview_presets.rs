use design_shot::{Browser, Exporter, preset};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let browser = Browser::new().await?;
    let tab = browser.new_tab().await?;
    tab.set_content(CARD_HTML).await?;
    let root = tab.find_element("body").await?;
    let exporter = Exporter::new(&browser);

    std::fs::create_dir_all("previews")?;
    for (platform, presets) in preset::presets_by_platform() {
        println!("{}", platform.display_name());
        for preset in presets {
            let bytes = exporter.preview(&root, &preset).await?;
            let path = format!("previews/{}.png", preset.id);
            std::fs::write(&path, &bytes)?;
            println!("  {:<24} {:>4}x{:<4} {}", preset.name, preset.width, preset.height, path);
        }
    }

    browser.close_async().await?;
    Ok(())
}

const CARD_HTML: &str = r#"<!DOCTYPE html>
<html>
<body style="margin: 0">
  <div class="infographic-canvas" style="width: 600px; height: 600px; display: grid; place-items: center;
       background: #111827; color: #f9fafb; font: 700 64px sans-serif;">
    Preview
  </div>
</body>
</html>"#;
