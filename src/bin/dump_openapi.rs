use std::fs;

fn main() -> anyhow::Result<()> {
    let doc = stayhub::docs::build_openapi(8000);
    let s = serde_json::to_string_pretty(&doc)?;
    let path = "/tmp/stayhub-openapi.json";
    fs::write(path, s)?;
    println!("wrote {}", path);
    Ok(())
}
