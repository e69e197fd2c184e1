//! Authoritative registry response schema and normalization.

use refcache_core::{Classification, EntityKind, EntityStatus, EntryValue, ErrorKind};
use serde::Deserialize;

use crate::failure::SourceFailure;
use crate::infer_kind_from_regime;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryResponse {
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub tipo_identificacion: Option<String>,
    #[serde(default)]
    pub regimen: Option<RegistryRegime>,
    #[serde(default)]
    pub situacion: Option<RegistrySituation>,
    #[serde(default)]
    pub actividades: Vec<RegistryActivity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryRegime {
    #[serde(default)]
    pub codigo: Option<serde_json::Value>,
    #[serde(default)]
    pub descripcion: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySituation {
    #[serde(default)]
    pub estado: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryActivity {
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub tipo: Option<String>,
    #[serde(default)]
    pub codigo: String,
    #[serde(default)]
    pub descripcion: String,
}

impl RegistryActivity {
    fn is_principal(&self) -> bool {
        self.tipo
            .as_deref()
            .map(|t| t.eq_ignore_ascii_case("p") || t.eq_ignore_ascii_case("principal"))
            .unwrap_or(false)
    }

    fn is_inactive(&self) -> bool {
        self.estado
            .as_deref()
            .map(|e| e.eq_ignore_ascii_case("i"))
            .unwrap_or(false)
    }
}

/// Identification type codes used by the registry.
fn kind_for_identification(code: Option<&str>) -> Option<EntityKind> {
    match code? {
        "01" | "03" => Some(EntityKind::Person),
        "02" => Some(EntityKind::Company),
        "04" => Some(EntityKind::Other),
        _ => None,
    }
}

fn status_for(situation: Option<&RegistrySituation>) -> EntityStatus {
    match situation.and_then(|s| s.estado.as_deref()) {
        None => EntityStatus::Active,
        Some(estado) => {
            let estado = estado.trim().to_lowercase();
            if estado.starts_with("inscrito") {
                EntityStatus::Active
            } else if estado.is_empty() {
                EntityStatus::Unknown
            } else {
                EntityStatus::Inactive
            }
        }
    }
}

/// Normalize a registry payload into an [`EntryValue`].
///
/// The principal activity is moved to the front of the classification list;
/// inactive activities are dropped.
pub fn normalize(
    response: RegistryResponse,
    raw: serde_json::Value,
) -> Result<EntryValue, SourceFailure> {
    let name = response.nombre.trim();
    if name.is_empty() {
        return Err(SourceFailure::new(
            ErrorKind::Unknown,
            "primary response did not include a name",
        ));
    }

    let (principal, secondary): (Vec<_>, Vec<_>) = response
        .actividades
        .iter()
        .filter(|a| !a.is_inactive() && !a.codigo.trim().is_empty())
        .partition(|a| a.is_principal());

    let classifications = principal
        .into_iter()
        .chain(secondary)
        .map(|a| Classification {
            code: a.codigo.trim().to_string(),
            description: a.descripcion.trim().to_string(),
        })
        .collect();

    let regime = response
        .regimen
        .as_ref()
        .and_then(|r| r.descripcion.as_deref())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    let kind = match kind_for_identification(response.tipo_identificacion.as_deref()) {
        Some(EntityKind::Company) => regime
            .as_deref()
            .map(infer_kind_from_regime)
            .filter(|k| *k != EntityKind::Other && *k != EntityKind::Person)
            .unwrap_or(EntityKind::Company),
        Some(kind) => kind,
        None => regime
            .as_deref()
            .map(infer_kind_from_regime)
            .unwrap_or(EntityKind::Other),
    };

    Ok(EntryValue {
        display_name: name.to_string(),
        classifications,
        status: status_for(response.situacion.as_ref()),
        kind,
        regime,
        raw,
    })
}
