// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The catalog of available taal recordings.
//!
//! Recordings are named `<taal>_<tempo>_<key>.<ext>`, e.g. `teentaal_150_Gs.flac`.
//! Sharps are spelled with a literal `s` in file names and shown as `#`.

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::error::CatalogError;

/// One parsed manifest entry.
#[derive(Debug, PartialEq, Eq)]
pub struct ManifestEntry {
    /// The taal name as written in the file name.
    pub cycle: String,
    /// The tempo in beats per minute.
    pub tempo: u32,
    /// The key as written in the file name.
    pub key: String,
}

/// Parses a file name of the form `<taal>_<tempo>_<key>.<ext>`. The taal is the
/// shortest prefix that is followed by a numeric tempo; the key is everything after
/// the tempo. Returns None if the name doesn't follow the convention.
pub fn parse_file_name(file_name: &str, extension: &str) -> Option<ManifestEntry> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if !ext.eq_ignore_ascii_case(extension) {
        return None;
    }

    for (split, _) in stem.match_indices('_') {
        let cycle = &stem[..split];
        let rest = &stem[split + 1..];
        if cycle.is_empty() {
            continue;
        }

        let Some((tempo, key)) = rest.split_once('_') else {
            continue;
        };
        if tempo.is_empty() || key.is_empty() || !tempo.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }

        let Ok(tempo) = tempo.parse::<u32>() else {
            continue;
        };
        return Some(ManifestEntry {
            cycle: cycle.to_string(),
            tempo,
            key: key.to_string(),
        });
    }

    None
}

/// Converts a key from its file name spelling to its display spelling (`Gs` -> `G#`).
pub fn display_key(key: &str) -> String {
    key.replace('s', "#")
}

/// Converts a key from its display spelling to its file name spelling (`G#` -> `Gs`).
pub fn file_key(key: &str) -> String {
    key.replace('#', "s")
}

/// Returns the locator of the tanpura recording for the given key.
pub fn drone_locator(base: &Path, key: &str, extension: &str) -> PathBuf {
    base.join(format!("{}.{}", file_key(key), extension))
}

struct KeyEntry {
    key: String,
    tempos: BTreeMap<u32, PathBuf>,
}

struct CycleEntry {
    /// The lowercased lookup name.
    name: String,
    /// The name as first seen in the manifest.
    display_name: String,
    keys: Vec<KeyEntry>,
}

/// Maps taal -> key -> tempo -> recording. Taals and keys keep the order they were
/// first seen in; tempos are sorted ascending. Built once, read-only afterwards.
pub struct AssetCatalog {
    cycles: Vec<CycleEntry>,
}

impl AssetCatalog {
    /// Builds a catalog from a list of file names relative to `base`. Names that don't
    /// follow the naming convention are skipped with a warning.
    pub fn from_file_names<I, S>(base: &Path, extension: &str, file_names: I) -> AssetCatalog
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut catalog = AssetCatalog { cycles: Vec::new() };

        for file_name in file_names {
            let file_name = file_name.as_ref();
            let Some(entry) = parse_file_name(file_name, extension) else {
                warn!(
                    file = file_name,
                    "File name does not match <taal>_<tempo>_<key>.{}", extension
                );
                continue;
            };
            catalog.insert(entry, base.join(file_name));
        }

        info!(
            taals = catalog.cycles.len(),
            recordings = catalog.len(),
            "Catalog built."
        );
        catalog
    }

    /// Builds a catalog from a JSON manifest containing a list of file names. The
    /// recordings are expected to live next to the manifest.
    pub fn from_manifest(path: &Path, extension: &str) -> Result<AssetCatalog, CatalogError> {
        let contents =
            fs::read_to_string(path).map_err(|e| CatalogError::Io(path.to_path_buf(), e))?;
        let file_names: Vec<String> = serde_json::from_str(&contents)
            .map_err(|e| CatalogError::Manifest(path.to_path_buf(), e))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(AssetCatalog::from_file_names(base, extension, file_names))
    }

    /// Builds a catalog by listing the files in the given directory.
    pub fn from_directory(dir: &Path, extension: &str) -> Result<AssetCatalog, CatalogError> {
        let mut file_names = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| CatalogError::Io(dir.to_path_buf(), e))? {
            let entry = entry.map_err(|e| CatalogError::Io(dir.to_path_buf(), e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let has_extension = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
            if let (true, Some(name)) = (has_extension, path.file_name()) {
                file_names.push(name.to_string_lossy().to_string());
            }
        }
        // Directory order is unspecified, so sort for a stable taal and key order.
        file_names.sort();
        Ok(AssetCatalog::from_file_names(dir, extension, file_names))
    }

    /// Loads a catalog from a path that is either a JSON manifest or a directory.
    pub fn load(path: &Path, extension: &str) -> Result<AssetCatalog, CatalogError> {
        if path.is_dir() {
            AssetCatalog::from_directory(path, extension)
        } else {
            AssetCatalog::from_manifest(path, extension)
        }
    }

    fn insert(&mut self, entry: ManifestEntry, locator: PathBuf) {
        let name = entry.cycle.to_lowercase();
        let index = match self.cycles.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.cycles.push(CycleEntry {
                    name,
                    display_name: entry.cycle.clone(),
                    keys: Vec::new(),
                });
                self.cycles.len() - 1
            }
        };
        let cycle = &mut self.cycles[index];

        let index = match cycle.keys.iter().position(|k| k.key == entry.key) {
            Some(index) => index,
            None => {
                cycle.keys.push(KeyEntry {
                    key: entry.key.clone(),
                    tempos: BTreeMap::new(),
                });
                cycle.keys.len() - 1
            }
        };
        let key = &mut cycle.keys[index];

        if let Some(previous) = key.tempos.insert(entry.tempo, locator) {
            debug!(previous = ?previous, "Replaced duplicate recording.");
        }
    }

    fn cycle(&self, cycle: &str) -> Option<&CycleEntry> {
        let name = cycle.to_lowercase();
        self.cycles.iter().find(|c| c.name == name)
    }

    fn key(&self, cycle: &str, key: &str) -> Option<&KeyEntry> {
        self.cycle(cycle)?.keys.iter().find(|k| k.key == key)
    }

    /// Resolves a recording. Returns None for combinations that have no recording.
    pub fn resolve(&self, cycle: &str, key: &str, tempo: u32) -> Option<&Path> {
        self.key(cycle, key)?.tempos.get(&tempo).map(PathBuf::as_path)
    }

    /// Returns true if the catalog knows the given taal.
    pub fn contains_cycle(&self, cycle: &str) -> bool {
        self.cycle(cycle).is_some()
    }

    /// Returns the lowercased names of all taals in catalog order.
    pub fn cycles(&self) -> Vec<&str> {
        self.cycles.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns the name of the taal as it appeared in the manifest.
    pub fn display_name(&self, cycle: &str) -> Option<&str> {
        self.cycle(cycle).map(|c| c.display_name.as_str())
    }

    /// Returns the keys recorded for the given taal in catalog order.
    pub fn available_keys(&self, cycle: &str) -> Vec<&str> {
        self.cycle(cycle)
            .map(|c| c.keys.iter().map(|k| k.key.as_str()).collect())
            .unwrap_or_default()
    }

    /// Returns the tempos recorded for the given taal and key, ascending.
    pub fn available_tempos(&self, cycle: &str, key: &str) -> Vec<u32> {
        self.key(cycle, key)
            .map(|k| k.tempos.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the total number of recordings.
    pub fn len(&self) -> usize {
        self.cycles
            .iter()
            .flat_map(|c| c.keys.iter())
            .map(|k| k.tempos.len())
            .sum()
    }

    /// Returns true if the catalog has no recordings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for AssetCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cycle in self.cycles.iter() {
            writeln!(f, "- {}", cycle.display_name)?;
            for key in cycle.keys.iter() {
                let tempos: Vec<String> = key.tempos.keys().map(|t| t.to_string()).collect();
                writeln!(f, "  - {}: {}", display_key(&key.key), tempos.join(", "))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{
        error::Error,
        fs,
        path::{Path, PathBuf},
    };

    use super::*;

    fn test_catalog() -> AssetCatalog {
        AssetCatalog::from_file_names(
            Path::new("sounds/taals"),
            "flac",
            [
                "Teentaal_150_Gs.flac",
                "teentaal_80_Gs.flac",
                "teentaal_100_Gs.flac",
                "teentaal_100_A.flac",
                "ektaal_60_A.flac",
                "taals.json",
                "jhaptaal_fast_C.flac",
                "notes.txt",
            ],
        )
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            Some(ManifestEntry {
                cycle: "teentaal".to_string(),
                tempo: 150,
                key: "Gs".to_string(),
            }),
            parse_file_name("teentaal_150_Gs.flac", "flac")
        );
        // The taal is the shortest prefix followed by a tempo.
        assert_eq!(
            Some(ManifestEntry {
                cycle: "jhap".to_string(),
                tempo: 90,
                key: "taal_C".to_string(),
            }),
            parse_file_name("jhap_90_taal_C.flac", "flac")
        );
        assert_eq!(
            Some(ManifestEntry {
                cycle: "slow_ektaal".to_string(),
                tempo: 40,
                key: "D".to_string(),
            }),
            parse_file_name("slow_ektaal_40_D.FLAC", "flac")
        );
        assert_eq!(None, parse_file_name("teentaal_150_Gs.mp3", "flac"));
        assert_eq!(None, parse_file_name("teentaal_Gs.flac", "flac"));
        assert_eq!(None, parse_file_name("teentaal_150_.flac", "flac"));
        assert_eq!(None, parse_file_name("_150_Gs.flac", "flac"));
        assert_eq!(None, parse_file_name("teentaal_150_Gs", "flac"));
        assert_eq!(None, parse_file_name("teentaal_99999999999_Gs.flac", "flac"));
    }

    #[test]
    fn test_resolve() {
        let catalog = test_catalog();
        assert_eq!(5, catalog.len());
        assert_eq!(
            Some(Path::new("sounds/taals/Teentaal_150_Gs.flac")),
            catalog.resolve("teentaal", "Gs", 150)
        );
        assert_eq!(
            Some(Path::new("sounds/taals/teentaal_80_Gs.flac")),
            catalog.resolve("TEENTAAL", "Gs", 80)
        );
        assert_eq!(None, catalog.resolve("teentaal", "Gs", 120));
        assert_eq!(None, catalog.resolve("teentaal", "C", 100));
        assert_eq!(None, catalog.resolve("rupak", "Gs", 100));
        assert_eq!(None, catalog.resolve("jhaptaal", "C", 0));
    }

    #[test]
    fn test_every_entry_resolves() {
        let catalog = test_catalog();
        for cycle in catalog.cycles() {
            for key in catalog.available_keys(cycle) {
                for tempo in catalog.available_tempos(cycle, key) {
                    assert!(catalog.resolve(cycle, key, tempo).is_some());
                }
            }
        }
    }

    #[test]
    fn test_ordering() {
        let catalog = test_catalog();
        assert_eq!(vec!["teentaal", "ektaal"], catalog.cycles());
        assert_eq!(Some("Teentaal"), catalog.display_name("teentaal"));
        assert_eq!(vec!["Gs", "A"], catalog.available_keys("teentaal"));
        assert_eq!(vec![80, 100, 150], catalog.available_tempos("teentaal", "Gs"));
        assert_eq!(vec![100], catalog.available_tempos("teentaal", "A"));
        assert!(catalog.available_keys("rupak").is_empty());
        assert!(catalog.available_tempos("ektaal", "Gs").is_empty());
        assert!(catalog.contains_cycle("EKTAAL"));
        assert!(!catalog.contains_cycle("jhaptaal"));
    }

    #[test]
    fn test_keys() {
        assert_eq!("G#", display_key("Gs"));
        assert_eq!("Gs", file_key("G#"));
        assert_eq!("A", display_key("A"));
        assert_eq!(
            PathBuf::from("sounds/tanpura/Cs.mp3"),
            drone_locator(Path::new("sounds/tanpura"), "C#", "mp3")
        );
        assert_eq!(
            PathBuf::from("sounds/tanpura/Gs.mp3"),
            drone_locator(Path::new("sounds/tanpura"), "Gs", "mp3")
        );
    }

    #[test]
    fn test_from_manifest() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let manifest = dir.path().join("taals.json");
        fs::write(
            &manifest,
            r#"["teentaal_150_Gs.flac", "ektaal_60_A.flac", "bad.flac"]"#,
        )?;

        let catalog = AssetCatalog::load(&manifest, "flac")?;
        assert_eq!(2, catalog.len());
        assert_eq!(
            Some(dir.path().join("teentaal_150_Gs.flac").as_path()),
            catalog.resolve("teentaal", "Gs", 150)
        );

        fs::write(&manifest, r#"{"not": "a list"}"#)?;
        assert!(matches!(
            AssetCatalog::load(&manifest, "flac"),
            Err(CatalogError::Manifest(_, _))
        ));
        assert!(matches!(
            AssetCatalog::load(&dir.path().join("missing.json"), "flac"),
            Err(CatalogError::Io(_, _))
        ));
        Ok(())
    }

    #[test]
    fn test_from_directory() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        for name in [
            "teentaal_150_Gs.flac",
            "teentaal_100_Gs.flac",
            "ektaal_60_A.flac",
            "taals.json",
        ] {
            fs::write(dir.path().join(name), b"")?;
        }
        fs::create_dir(dir.path().join("jhaptaal_90_C.flac"))?;

        let catalog = AssetCatalog::load(dir.path(), "flac")?;
        assert_eq!(3, catalog.len());
        assert_eq!(vec!["ektaal", "teentaal"], catalog.cycles());
        assert_eq!(vec![100, 150], catalog.available_tempos("teentaal", "Gs"));
        Ok(())
    }

    #[test]
    fn test_display() {
        let catalog = test_catalog();
        let listing = catalog.to_string();
        assert!(listing.contains("- Teentaal\n  - G#: 80, 100, 150\n  - A: 100\n"));
        assert!(listing.contains("- ektaal\n  - A: 60\n"));
    }
}
