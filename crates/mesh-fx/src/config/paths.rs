//! Standard locations of effect state

use std::path::{Path, PathBuf};

/// Folder under the collection holding all effect state
pub const EFFECTS_FOLDER: &str = "effects";
/// Folder under [`EFFECTS_FOLDER`] with one default preset per effect
pub const DEFAULTS_FOLDER: &str = "defaults";
/// Per-chain snapshot restored at startup
pub const CHAINS_FILE: &str = "chains.yaml";
/// Saved chain-preset library
pub const PRESETS_FILE: &str = "presets.yaml";
/// Effects configuration
pub const CONFIG_FILE: &str = "effects-config.yaml";

/// Get the default collection path
///
/// Returns: `~/Music/mesh-collection`
pub fn default_collection_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Music")
        .join("mesh-collection")
}

/// Effect state folder of a collection: `{collection}/effects`
pub fn effects_folder(collection_path: &Path) -> PathBuf {
    collection_path.join(EFFECTS_FOLDER)
}

/// Config file of a collection: `{collection}/effects-config.yaml`
pub fn effects_config_path(collection_path: &Path) -> PathBuf {
    collection_path.join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_path_ends_with_mesh_collection() {
        assert!(default_collection_path().ends_with("mesh-collection"));
    }

    #[test]
    fn test_effects_paths() {
        let collection = Path::new("/music/mesh-collection");
        assert_eq!(effects_folder(collection), Path::new("/music/mesh-collection/effects"));
        assert!(effects_config_path(collection).ends_with(CONFIG_FILE));
    }
}
