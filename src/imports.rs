// imports.rs — fixture loading for tags and ingredients.
//
// Supports two on-disk formats, chosen by file extension:
//   *.json — an array of objects: [{"name": "...", "measurement_unit": "..."}]
//            (tags use {"name": "...", "slug": "..."})
//   *.csv  — headerless rows: name,measurement_unit (or name,slug)

use anyhow::{bail, Context as _, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureKind {
    Ingredients,
    Tags,
}

#[derive(Deserialize)]
struct IngredientFixture {
    name: String,
    measurement_unit: String,
}

#[derive(Deserialize)]
struct TagFixture {
    name: String,
    slug: String,
}

/// Outcome of an import run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub inserted: u64,
    /// Rows skipped because an equal record already existed.
    pub skipped: u64,
}

pub async fn import_fixtures(
    storage: &Storage,
    kind: FixtureKind,
    path: &Path,
) -> Result<ImportStats> {
    let pairs = read_pairs(kind, path)?;
    let mut stats = ImportStats::default();
    for (a, b) in &pairs {
        let fresh = match kind {
            FixtureKind::Ingredients => storage.insert_ingredient(a, b).await?,
            FixtureKind::Tags => storage.insert_tag(a, b).await?,
        };
        if fresh {
            stats.inserted += 1;
        } else {
            stats.skipped += 1;
        }
    }
    info!(
        file = %path.display(),
        inserted = stats.inserted,
        skipped = stats.skipped,
        "fixture import finished"
    );
    Ok(stats)
}

/// Parse the fixture file into (name, unit-or-slug) pairs.
fn read_pairs(kind: FixtureKind, path: &Path) -> Result<Vec<(String, String)>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "json" => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            let pairs = match kind {
                FixtureKind::Ingredients => {
                    let rows: Vec<IngredientFixture> = serde_json::from_str(&contents)
                        .with_context(|| format!("invalid JSON in {}", path.display()))?;
                    rows.into_iter()
                        .map(|r| (r.name, r.measurement_unit))
                        .collect()
                }
                FixtureKind::Tags => {
                    let rows: Vec<TagFixture> = serde_json::from_str(&contents)
                        .with_context(|| format!("invalid JSON in {}", path.display()))?;
                    rows.into_iter().map(|r| (r.name, r.slug)).collect()
                }
            };
            Ok(pairs)
        }
        "csv" => {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .from_path(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            let mut pairs = Vec::new();
            for record in reader.records() {
                let record = record.with_context(|| format!("bad CSV in {}", path.display()))?;
                let name = record.get(0).unwrap_or("").trim();
                let second = record.get(1).unwrap_or("").trim();
                if name.is_empty() || second.is_empty() {
                    bail!("CSV row with empty field in {}", path.display());
                }
                pairs.push((name.to_string(), second.to_string()));
            }
            Ok(pairs)
        }
        other => bail!("unsupported fixture format '.{other}' (expected .json or .csv)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh_storage() -> (Storage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let s = Storage::new(dir.path()).await.unwrap();
        (s, dir)
    }

    #[tokio::test]
    async fn imports_ingredients_from_json() {
        let (s, dir) = fresh_storage().await;
        let file = dir.path().join("ingredients.json");
        std::fs::write(
            &file,
            r#"[{"name": "flour", "measurement_unit": "g"},
                {"name": "milk", "measurement_unit": "ml"}]"#,
        )
        .unwrap();
        let stats = import_fixtures(&s, FixtureKind::Ingredients, &file)
            .await
            .unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.skipped, 0);
        assert_eq!(s.list_ingredients(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn imports_ingredients_from_csv_and_skips_duplicates() {
        let (s, dir) = fresh_storage().await;
        let file = dir.path().join("ingredients.csv");
        std::fs::write(&file, "flour,g\nmilk,ml\nflour,g\n").unwrap();
        let stats = import_fixtures(&s, FixtureKind::Ingredients, &file)
            .await
            .unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn imports_tags_from_json() {
        let (s, dir) = fresh_storage().await;
        let file = dir.path().join("tags.json");
        std::fs::write(
            &file,
            r#"[{"name": "Breakfast", "slug": "breakfast"}]"#,
        )
        .unwrap();
        let stats = import_fixtures(&s, FixtureKind::Tags, &file).await.unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(s.list_tags().await.unwrap()[0].slug, "breakfast");
    }

    #[tokio::test]
    async fn rejects_unknown_extension() {
        let (s, dir) = fresh_storage().await;
        let file = dir.path().join("data.yaml");
        std::fs::write(&file, "x").unwrap();
        assert!(import_fixtures(&s, FixtureKind::Ingredients, &file)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn rejects_csv_with_empty_field() {
        let (s, dir) = fresh_storage().await;
        let file = dir.path().join("bad.csv");
        std::fs::write(&file, "flour,\n").unwrap();
        assert!(import_fixtures(&s, FixtureKind::Ingredients, &file)
            .await
            .is_err());
    }
}
