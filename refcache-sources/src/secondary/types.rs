//! Fallback directory response schema and normalization.

use refcache_core::{Classification, EntityKind, EntityStatus, EntryValue, ErrorKind};
use serde::Deserialize;

use crate::failure::SourceFailure;
use crate::infer_kind_from_regime;

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryResponse {
    #[serde(default)]
    pub resultcount: Option<u64>,
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub results: Vec<DirectoryRecord>,
    #[serde(default)]
    pub regimen: Option<DirectoryRegime>,
    #[serde(default)]
    pub actividades: Vec<DirectoryActivity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryRecord {
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub guess_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryRegime {
    #[serde(default)]
    pub descripcion: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryActivity {
    #[serde(default)]
    pub codigo: String,
    #[serde(default)]
    pub descripcion: String,
}

fn kind_for_guess(guess: Option<&str>) -> Option<EntityKind> {
    match guess?.trim().to_ascii_uppercase().as_str() {
        "FISICA" | "DIMEX" => Some(EntityKind::Person),
        "JURIDICA" => Some(EntityKind::Company),
        _ => None,
    }
}

/// Normalize a directory payload into an [`EntryValue`].
///
/// An empty result set is reported as `not_found`.
pub fn normalize(
    response: DirectoryResponse,
    raw: serde_json::Value,
) -> Result<EntryValue, SourceFailure> {
    let record = response.results.first();

    let name = response
        .nombre
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or_else(|| {
            record
                .and_then(|r| r.fullname.as_deref())
                .map(str::trim)
                .filter(|n| !n.is_empty())
        });

    let Some(name) = name else {
        let kind = if response.resultcount == Some(0) || response.results.is_empty() {
            ErrorKind::NotFound
        } else {
            ErrorKind::Unknown
        };
        return Err(SourceFailure::new(
            kind,
            "secondary response did not include a name",
        ));
    };

    let regime = response
        .regimen
        .as_ref()
        .and_then(|r| r.descripcion.as_deref())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    let kind = kind_for_guess(record.and_then(|r| r.guess_type.as_deref()))
        .or_else(|| regime.as_deref().map(infer_kind_from_regime))
        .unwrap_or(EntityKind::Other);

    let classifications = response
        .actividades
        .iter()
        .filter(|a| !a.codigo.trim().is_empty())
        .map(|a| Classification {
            code: a.codigo.trim().to_string(),
            description: a.descripcion.trim().to_string(),
        })
        .collect();

    Ok(EntryValue {
        display_name: name.to_string(),
        classifications,
        status: EntityStatus::Active,
        kind,
        regime,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: serde_json::Value) -> Result<EntryValue, SourceFailure> {
        let response: DirectoryResponse = serde_json::from_value(raw.clone()).unwrap();
        normalize(response, raw)
    }

    #[test]
    fn test_name_falls_back_to_first_record() {
        let value = parse(json!({
            "resultcount": 1,
            "results": [{"fullname": "MARIA RODRIGUEZ", "guess_type": "FISICA"}]
        }))
        .unwrap();
        assert_eq!(value.display_name, "MARIA RODRIGUEZ");
        assert_eq!(value.kind, EntityKind::Person);
    }

    #[test]
    fn test_top_level_name_and_activities() {
        let value = parse(json!({
            "nombre": "ACME S.A.",
            "results": [{"fullname": "ignored", "guess_type": "JURIDICA"}],
            "actividades": [{"codigo": "620100", "descripcion": "Software"}]
        }))
        .unwrap();
        assert_eq!(value.display_name, "ACME S.A.");
        assert_eq!(value.kind, EntityKind::Company);
        assert_eq!(value.primary_classification().unwrap().code, "620100");
    }

    #[test]
    fn test_empty_results_are_not_found() {
        let err = parse(json!({"resultcount": 0, "results": []})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
