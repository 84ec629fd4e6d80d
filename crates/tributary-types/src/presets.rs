//! Built-in dataset descriptors.
//!
//! `media` is an anime catalog returned under a `data` member; `universe`
//! is a list of fictional noble houses returned as a bare JSON array.

use serde_json::json;

use crate::descriptor::{
    ColumnMapping, DatasetDescriptor, Derivation, DerivedField, FillRule, FilterOp,
    FilterPredicate, TableMapping,
};

/// Length of the derived `short_synopsis` field.
pub const SHORT_SYNOPSIS_CHARS: usize = 100;

/// Names accepted by [`by_name`].
pub const NAMES: [&str; 2] = ["media", "universe"];

pub fn media() -> DatasetDescriptor {
    DatasetDescriptor {
        name: "media".to_string(),
        raw_key: "anime_raw.json".to_string(),
        clean_key: "tv_anime_data.json".to_string(),
        records_path: "/data".to_string(),
        drop_incomplete_rows: true,
        required_fields: None,
        fill: vec![FillRule {
            field: "episodes".to_string(),
            value: json!(0),
        }],
        dedup_key: Some("title".to_string()),
        columns_to_drop: strings(&["hasEpisode", "hasRanking", "image", "link", "thumb"]),
        filter: Some(FilterPredicate {
            field: "type".to_string(),
            op: FilterOp::Eq,
            value: json!("TV"),
        }),
        derived: vec![DerivedField {
            name: "short_synopsis".to_string(),
            derivation: Derivation::Truncate {
                source: "synopsis".to_string(),
                max_chars: SHORT_SYNOPSIS_CHARS,
            },
        }],
        table: TableMapping {
            schema: None,
            name: "anime_table".to_string(),
            columns: vec![
                ColumnMapping::same("_id"),
                ColumnMapping::same("title"),
                ColumnMapping::new("alternativetitles", "alternativeTitles"),
                ColumnMapping::same("ranking"),
                ColumnMapping::same("genres"),
                ColumnMapping::same("episodes"),
                ColumnMapping::same("status"),
                ColumnMapping::same("synopsis"),
                ColumnMapping::same("type"),
                ColumnMapping::same("short_synopsis"),
            ],
        },
    }
}

pub fn universe() -> DatasetDescriptor {
    DatasetDescriptor {
        name: "universe".to_string(),
        raw_key: "got_raw.json".to_string(),
        clean_key: "got_cleaned.json".to_string(),
        records_path: String::new(),
        drop_incomplete_rows: false,
        required_fields: None,
        fill: vec![],
        dedup_key: None,
        columns_to_drop: strings(&[
            "titles",
            "seats",
            "heir",
            "founded",
            "founder",
            "diedOut",
            "cadetBranches",
            "ancestralWeapons",
        ]),
        filter: Some(FilterPredicate {
            field: "words".to_string(),
            op: FilterOp::Ne,
            value: json!(""),
        }),
        derived: vec![],
        table: TableMapping {
            schema: None,
            name: "got_houses_table".to_string(),
            columns: vec![
                ColumnMapping::same("url"),
                ColumnMapping::same("name"),
                ColumnMapping::same("region"),
                ColumnMapping::new("coatofarms", "coatOfArms"),
                ColumnMapping::same("words"),
                ColumnMapping::new("currentlord", "currentLord"),
                ColumnMapping::same("overlord"),
                ColumnMapping::new("swornmembers", "swornMembers"),
            ],
        },
    }
}

pub fn all() -> Vec<DatasetDescriptor> {
    vec![media(), universe()]
}

pub fn by_name(name: &str) -> Option<DatasetDescriptor> {
    match name {
        "media" => Some(media()),
        "universe" => Some(universe()),
        _ => None,
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}
