use actsync_core::AppConfig;

pub(crate) fn list_providers(config: &AppConfig) -> anyhow::Result<()> {
    let file = actsync_core::load_providers(&config.providers_path)?;
    println!(
        "{:<28} {:<8} {:<7} {:<6} NAME",
        "SLUG", "ACTIVE", "SCHEMA", "ENTRY"
    );
    for provider in &file.providers {
        println!(
            "{:<28} {:<8} v{:<6} {:<6} {}",
            provider.slug(),
            if provider.is_active { "yes" } else { "no" },
            provider.schema.version,
            provider.entry_urls.len(),
            provider.name
        );
    }
    Ok(())
}
