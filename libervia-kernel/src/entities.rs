//! Core-owned entity structures.
//!
//! These are the records the decision kernel persists per tenant. The
//! gateway treats them as opaque payloads; only the backup engine and the
//! public API read them back.

use libervia_core::Timestamp;
use serde::{Deserialize, Serialize};

use crate::store::StoredItem;

/// A registered decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decisao {
    pub id: String,
    pub situacao: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocolo: Option<String>,
    pub nivel_autonomia: i32,
    pub episodio_id: String,
    #[serde(default)]
    pub contexto: serde_json::Value,
    pub created_at: Timestamp,
}

impl StoredItem for Decisao {
    fn item_id(&self) -> &str {
        &self.id
    }
}

/// Status of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodioStatus {
    Aberto,
    Encerrado,
}

/// An episode opened by a decision and closed explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episodio {
    pub id: String,
    pub decisao_id: String,
    pub status: EpisodioStatus,
    pub aberto_em: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encerrado_em: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resultado: Option<serde_json::Value>,
}

impl StoredItem for Episodio {
    fn item_id(&self) -> &str {
        &self.id
    }
}

/// A consequence observation attached to an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observacao {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episodio_id: Option<String>,
    pub descricao: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impacto: Option<String>,
    pub created_at: Timestamp,
}

impl StoredItem for Observacao {
    fn item_id(&self) -> &str {
        &self.id
    }
}

/// An autonomy mandate granted to the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomyMandate {
    pub id: String,
    pub escopo: String,
    pub nivel: i32,
    pub ativo: bool,
    pub created_at: Timestamp,
}

impl StoredItem for AutonomyMandate {
    fn item_id(&self) -> &str {
        &self.id
    }
}

/// A case flagged for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewCase {
    pub id: String,
    pub decisao_id: String,
    pub motivo: String,
    pub resolvido: bool,
    pub created_at: Timestamp,
}

impl StoredItem for ReviewCase {
    fn item_id(&self) -> &str {
        &self.id
    }
}

/// Input for registering a decision via the public API.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisaoInput {
    pub situacao: String,
    #[serde(default)]
    pub protocolo: Option<String>,
    #[serde(default)]
    pub nivel_autonomia: Option<i32>,
    #[serde(default)]
    pub contexto: serde_json::Value,
}

/// Input for registering a consequence observation.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservacaoInput {
    #[serde(default)]
    pub episodio_id: Option<String>,
    pub descricao: String,
    #[serde(default)]
    pub impacto: Option<String>,
}
