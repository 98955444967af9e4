//! The per-tenant core instance.
//!
//! One `CoreInstance` owns a tenant's event log and entity stores. The
//! gateway's runtime cache constructs at most one per active tenant and
//! forwards cognitive operations here. Decision orchestration beyond
//! record-keeping (protocol selection, contract state) belongs to the
//! kernel's deeper layers and is deliberately minimal in this facade.

use chrono::Utc;
use libervia_core::{
    ChainVerification, EventLogStatus, EventRecord, StorageError, TenantId, Timestamp,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use uuid::Uuid;

use crate::entities::{
    AutonomyMandate, Decisao, DecisaoInput, Episodio, EpisodioStatus, Observacao, ObservacaoInput,
    ReviewCase,
};
use crate::event_log::EventLog;
use crate::store::JsonStore;

/// Actor recorded on gateway-forwarded events.
const GATEWAY_ACTOR: &str = "gateway";

/// Tail window used by the fast chain verification.
const FAST_VERIFY_WINDOW: usize = 256;

/// Live metrics snapshot for one instance.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMetrics {
    pub tenant_id: TenantId,
    pub started_at: Timestamp,
    pub last_activity: Timestamp,
    pub event_count: u64,
    pub decision_count: u64,
    pub episode_count: u64,
    pub observation_count: u64,
}

/// A tenant's decision kernel, opened on its data directory.
pub struct CoreInstance {
    tenant_id: TenantId,
    data_dir: PathBuf,
    event_log: EventLog,
    decisoes: JsonStore<Decisao>,
    episodios: JsonStore<Episodio>,
    observacoes: JsonStore<Observacao>,
    mandates: JsonStore<AutonomyMandate>,
    review_cases: JsonStore<ReviewCase>,
    started_at: Timestamp,
    last_activity: RwLock<Timestamp>,
}

impl CoreInstance {
    /// Open all stores under `data_dir`. The directory must already exist
    /// (the registry creates it at tenant registration).
    pub fn open(tenant_id: TenantId, data_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let data_dir = data_dir.into();
        let now = Utc::now();
        tracing::debug!(tenant_id = %tenant_id, data_dir = %data_dir.display(), "opening core instance");
        Ok(Self {
            event_log: EventLog::open(data_dir.join("event-log"))?,
            decisoes: JsonStore::open(data_dir.join("decisoes.json"))?,
            episodios: JsonStore::open(data_dir.join("episodios.json"))?,
            observacoes: JsonStore::open(data_dir.join("observacoes_de_consequencia.json"))?,
            mandates: JsonStore::open(data_dir.join("autonomy_mandates.json"))?,
            review_cases: JsonStore::open(data_dir.join("review_cases.json"))?,
            tenant_id,
            data_dir,
            started_at: now,
            last_activity: RwLock::new(now),
        })
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn last_activity(&self) -> Timestamp {
        self.last_activity
            .read()
            .map(|t| *t)
            .unwrap_or(self.started_at)
    }

    /// Record request activity on this instance.
    pub fn touch(&self) {
        if let Ok(mut guard) = self.last_activity.write() {
            *guard = Utc::now();
        }
    }

    // ========================================================================
    // Cognitive operations (forwarded from /api/v1)
    // ========================================================================

    /// Register a decision: persists the record, opens its episode, and
    /// appends both facts to the event chain.
    pub fn registrar_decisao(&self, input: DecisaoInput) -> Result<Decisao, StorageError> {
        self.touch();
        let now = Utc::now();
        let decisao_id = format!("dec_{}", Uuid::new_v4().simple());
        let episodio_id = format!("ep_{}", Uuid::new_v4().simple());

        let decisao = Decisao {
            id: decisao_id.clone(),
            situacao: input.situacao,
            protocolo: input.protocolo,
            nivel_autonomia: input.nivel_autonomia.unwrap_or(0),
            episodio_id: episodio_id.clone(),
            contexto: input.contexto,
            created_at: now,
        };
        let episodio = Episodio {
            id: episodio_id.clone(),
            decisao_id: decisao_id.clone(),
            status: EpisodioStatus::Aberto,
            aberto_em: now,
            encerrado_em: None,
            resultado: None,
        };

        self.decisoes.insert(decisao.clone())?;
        self.episodios.insert(episodio)?;
        self.event_log.append(
            "decisao_registrada",
            "decisao",
            &decisao_id,
            GATEWAY_ACTOR,
            json!({ "situacao": decisao.situacao, "episodio_id": episodio_id }),
        )?;
        self.event_log.append(
            "episodio_aberto",
            "episodio",
            &episodio_id,
            GATEWAY_ACTOR,
            json!({ "decisao_id": decisao_id }),
        )?;
        Ok(decisao)
    }

    /// Fetch an episode by id.
    pub fn obter_episodio(&self, id: &str) -> Result<Option<Episodio>, StorageError> {
        self.touch();
        self.episodios.get(id)
    }

    /// Close an open episode. Closing an already-closed episode is an error.
    pub fn encerrar_episodio(
        &self,
        id: &str,
        resultado: Option<serde_json::Value>,
    ) -> Result<Episodio, StorageError> {
        self.touch();
        let mut episodio = self
            .episodios
            .get(id)?
            .ok_or_else(|| StorageError::NotFound {
                entity: "episodio".to_string(),
                id: id.to_string(),
            })?;
        if episodio.status == EpisodioStatus::Encerrado {
            return Err(StorageError::Corrupt {
                path: self.data_dir.display().to_string(),
                reason: format!("episodio {} already closed", id),
            });
        }
        episodio.status = EpisodioStatus::Encerrado;
        episodio.encerrado_em = Some(Utc::now());
        episodio.resultado = resultado;
        self.episodios.update(episodio.clone())?;
        self.event_log.append(
            "episodio_encerrado",
            "episodio",
            id,
            GATEWAY_ACTOR,
            json!({ "decisao_id": episodio.decisao_id }),
        )?;
        Ok(episodio)
    }

    /// Register a consequence observation.
    pub fn registrar_observacao(
        &self,
        input: ObservacaoInput,
    ) -> Result<Observacao, StorageError> {
        self.touch();
        let observacao = Observacao {
            id: format!("obs_{}", Uuid::new_v4().simple()),
            episodio_id: input.episodio_id,
            descricao: input.descricao,
            impacto: input.impacto,
            created_at: Utc::now(),
        };
        self.observacoes.insert(observacao.clone())?;
        self.event_log.append(
            "observacao_registrada",
            "observacao",
            &observacao.id,
            GATEWAY_ACTOR,
            json!({ "episodio_id": observacao.episodio_id }),
        )?;
        Ok(observacao)
    }

    // ========================================================================
    // Event log and audit
    // ========================================================================

    /// Tail listing of the event chain (`limit` newest entries in order).
    pub fn listar_eventos(
        &self,
        limit: usize,
        entidade: Option<&str>,
    ) -> Result<(Vec<EventRecord>, u64), StorageError> {
        self.touch();
        self.event_log.list(limit, entidade)
    }

    pub fn eventlog_status(&self) -> Result<EventLogStatus, StorageError> {
        self.event_log.status()
    }

    /// Full audit walk over the chain.
    pub fn audit_verify(&self) -> Result<ChainVerification, StorageError> {
        self.event_log.verify()
    }

    /// Tail-window audit walk.
    pub fn audit_verify_fast(&self) -> Result<ChainVerification, StorageError> {
        self.event_log.verify_fast(FAST_VERIFY_WINDOW)
    }

    /// JSONL export of the full chain.
    pub fn audit_export(&self) -> Result<String, StorageError> {
        self.event_log.export()
    }

    /// Replay the chain into per-entity event counts. A cheap projection
    /// that doubles as a consistency probe for operators.
    pub fn audit_replay(&self) -> Result<BTreeMap<String, u64>, StorageError> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for record in self.event_log.all()? {
            *counts.entry(record.entidade).or_insert(0) += 1;
        }
        Ok(counts)
    }

    // ========================================================================
    // Backup data providers
    // ========================================================================

    pub fn all_events(&self) -> Result<Vec<EventRecord>, StorageError> {
        self.event_log.all()
    }

    pub fn all_observacoes(&self) -> Result<Vec<Observacao>, StorageError> {
        self.observacoes.list()
    }

    pub fn all_mandates(&self) -> Result<Vec<AutonomyMandate>, StorageError> {
        self.mandates.list()
    }

    pub fn all_review_cases(&self) -> Result<Vec<ReviewCase>, StorageError> {
        self.review_cases.list()
    }

    /// Existence probes used by the append-only restore path.
    pub fn has_event(&self, id: &str) -> Result<bool, StorageError> {
        self.event_log.contains(id)
    }

    pub fn has_observacao(&self, id: &str) -> Result<bool, StorageError> {
        self.observacoes.contains(id)
    }

    pub fn has_mandate(&self, id: &str) -> Result<bool, StorageError> {
        self.mandates.contains(id)
    }

    pub fn has_review_case(&self, id: &str) -> Result<bool, StorageError> {
        self.review_cases.contains(id)
    }

    /// Appenders used by the effective restore path. Existing items are
    /// never touched; the restore service checks existence first.
    pub fn append_event(&self, record: EventRecord) -> Result<(), StorageError> {
        self.event_log.append_existing(record)
    }

    pub fn append_observacao(&self, item: Observacao) -> Result<(), StorageError> {
        self.observacoes.insert(item)
    }

    pub fn append_mandate(&self, item: AutonomyMandate) -> Result<(), StorageError> {
        self.mandates.insert(item)
    }

    pub fn append_review_case(&self, item: ReviewCase) -> Result<(), StorageError> {
        self.review_cases.insert(item)
    }

    // ========================================================================
    // Health and metrics
    // ========================================================================

    /// An instance is healthy when its chain tail verifies.
    pub fn is_healthy(&self) -> bool {
        self.audit_verify_fast().map(|v| v.valid).unwrap_or(false)
    }

    pub fn metrics(&self) -> Result<InstanceMetrics, StorageError> {
        Ok(InstanceMetrics {
            tenant_id: self.tenant_id.clone(),
            started_at: self.started_at,
            last_activity: self.last_activity(),
            event_count: self.event_log.status()?.total_events,
            decision_count: self.decisoes.len()? as u64,
            episode_count: self.episodios.len()? as u64,
            observation_count: self.observacoes.len()? as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_instance(dir: &Path) -> CoreInstance {
        match CoreInstance::open(TenantId::new("acme"), dir) {
            Ok(instance) => instance,
            Err(e) => panic!("failed to open instance: {}", e),
        }
    }

    fn decisao_input() -> DecisaoInput {
        DecisaoInput {
            situacao: "pedido_reembolso".to_string(),
            protocolo: Some("financeiro".to_string()),
            nivel_autonomia: Some(2),
            contexto: json!({"valor": 120.5}),
        }
    }

    #[test]
    fn test_registrar_decisao_opens_episode_and_chains_events() -> Result<(), StorageError> {
        let dir = tempfile::tempdir().map_err(|e| StorageError::Io {
            path: "tempdir".into(),
            reason: e.to_string(),
        })?;
        let instance = open_instance(dir.path());

        let decisao = instance.registrar_decisao(decisao_input())?;
        let episodio = instance.obter_episodio(&decisao.episodio_id)?;
        assert_eq!(
            episodio.as_ref().map(|e| e.status),
            Some(EpisodioStatus::Aberto)
        );

        let status = instance.eventlog_status()?;
        assert_eq!(status.total_events, 2);
        assert!(instance.audit_verify()?.valid);
        Ok(())
    }

    #[test]
    fn test_encerrar_episodio_rejects_double_close() -> Result<(), StorageError> {
        let dir = tempfile::tempdir().map_err(|e| StorageError::Io {
            path: "tempdir".into(),
            reason: e.to_string(),
        })?;
        let instance = open_instance(dir.path());

        let decisao = instance.registrar_decisao(decisao_input())?;
        let closed = instance.encerrar_episodio(&decisao.episodio_id, Some(json!({"ok": true})))?;
        assert_eq!(closed.status, EpisodioStatus::Encerrado);
        assert!(closed.encerrado_em.is_some());

        assert!(instance
            .encerrar_episodio(&decisao.episodio_id, None)
            .is_err());
        Ok(())
    }

    #[test]
    fn test_observacao_and_replay_projection() -> Result<(), StorageError> {
        let dir = tempfile::tempdir().map_err(|e| StorageError::Io {
            path: "tempdir".into(),
            reason: e.to_string(),
        })?;
        let instance = open_instance(dir.path());

        let decisao = instance.registrar_decisao(decisao_input())?;
        instance.registrar_observacao(ObservacaoInput {
            episodio_id: Some(decisao.episodio_id.clone()),
            descricao: "cliente satisfeito".to_string(),
            impacto: Some("positivo".to_string()),
        })?;

        let counts = instance.audit_replay()?;
        assert_eq!(counts.get("decisao"), Some(&1));
        assert_eq!(counts.get("episodio"), Some(&1));
        assert_eq!(counts.get("observacao"), Some(&1));
        Ok(())
    }

    #[test]
    fn test_metrics_reflect_activity() -> Result<(), StorageError> {
        let dir = tempfile::tempdir().map_err(|e| StorageError::Io {
            path: "tempdir".into(),
            reason: e.to_string(),
        })?;
        let instance = open_instance(dir.path());
        instance.registrar_decisao(decisao_input())?;

        let metrics = instance.metrics()?;
        assert_eq!(metrics.decision_count, 1);
        assert_eq!(metrics.episode_count, 1);
        assert_eq!(metrics.event_count, 2);
        assert!(metrics.last_activity >= metrics.started_at);
        assert!(instance.is_healthy());
        Ok(())
    }
}
