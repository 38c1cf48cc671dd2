use album_store::storage::NamingStrategy;
use uuid::Uuid;

/// Derives the key an upload is stored under.
///
/// Client supplied filenames are reduced to their final component first, so
/// a name like `../../etc/cover.jpg` can never address anything outside the
/// store.
pub(crate) fn storage_name(strategy: NamingStrategy, filename: &str) -> Option<String> {
    let base = base_name(filename)?;
    match strategy {
        NamingStrategy::Original => Some(base.to_string()),
        NamingStrategy::Unique => Some(format!("{}{}", Uuid::new_v4(), extension(base))),
    }
}

fn base_name(filename: &str) -> Option<&str> {
    filename
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.trim().is_empty() && *name != "." && *name != "..")
}

/// Suffix from the final dot, dot included. Empty when there is none.
fn extension(base: &str) -> &str {
    base.rfind('.').map_or("", |idx| &base[idx..])
}
