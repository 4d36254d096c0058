use anyhow::Result;
use console::style;
use tldw_core::settings::{API_KEY, SettingsStore};

/// Show enough of a key to recognise it, never the whole thing.
pub fn mask_key(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    if key.chars().count() <= 8 {
        "*".repeat(key.chars().count())
    } else {
        format!("{visible}{}", "*".repeat(8))
    }
}

pub async fn set_key(store: &dyn SettingsStore, key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Please enter a valid API Key.");
    }
    store.set(API_KEY, key).await?;
    println!("{} API Key saved!", style("✓").green().bold());
    Ok(())
}

pub async fn show(store: &dyn SettingsStore) -> Result<()> {
    match store.get(API_KEY).await? {
        Some(key) if !key.is_empty() => {
            println!("{} {}", style("API Key:").dim(), style(mask_key(&key)).cyan())
        }
        _ => println!(
            "{} no API Key stored, set one with `tldw options set-key`",
            style("!").yellow().bold()
        ),
    }
    Ok(())
}

pub async fn clear(store: &dyn SettingsStore) -> Result<()> {
    store.remove(API_KEY).await?;
    println!("{} API Key removed", style("✓").green().bold());
    Ok(())
}

#[cfg(test)]
mod tests {
    use tldw_core::MemorySettingsStore;

    use super::*;

    #[test]
    fn masks_all_but_prefix() {
        assert_eq!(mask_key("AIzaSyExample123"), "AIza********");
        assert_eq!(mask_key("short"), "*****");
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let store = MemorySettingsStore::new();
        let err = set_key(&store, "   ").await.unwrap_err();
        assert_eq!(err.to_string(), "Please enter a valid API Key.");
        assert_eq!(store.get(API_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_clear() {
        let store = MemorySettingsStore::new();
        set_key(&store, " abc ").await.unwrap();
        assert_eq!(store.get(API_KEY).await.unwrap().as_deref(), Some("abc"));
        clear(&store).await.unwrap();
        assert_eq!(store.get(API_KEY).await.unwrap(), None);
    }
}
