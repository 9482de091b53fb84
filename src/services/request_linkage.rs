// 业务申请关联服务
// 读取申请快照，并在支付成功后把申请推进到待处理状态

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{PaymentError, PaymentResult};
use crate::models::{Demande, RequestStatus, RequesterContact};

/// 业务申请访问接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestLinkage: Send + Sync {
    /// 查询申请快照
    async fn find_request(&self, request_id: i64) -> PaymentResult<Option<Demande>>;

    /// 将等待支付的申请标记为待处理，重复调用无副作用
    async fn mark_awaiting_processing(&self, request_id: i64) -> PaymentResult<()>;
}

#[derive(Debug, FromRow)]
struct DemandeRow {
    id: i64,
    statut: String,
    utilisateur_id: i64,
    montant_total: Decimal,
    prenom: Option<String>,
    nom: Option<String>,
    telephone: Option<String>,
    email: Option<String>,
}

impl From<DemandeRow> for Demande {
    fn from(row: DemandeRow) -> Self {
        Demande {
            id: row.id,
            owner_id: row.utilisateur_id,
            status: RequestStatus::from_code(&row.statut),
            total_amount: row.montant_total,
            contact: RequesterContact {
                first_name: row.prenom,
                last_name: row.nom,
                phone: row.telephone,
                email: row.email,
            },
        }
    }
}

/// 基于PostgreSQL的申请访问实现
pub struct PgRequestLinkage {
    pool: PgPool,
}

impl PgRequestLinkage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequestLinkage for PgRequestLinkage {
    async fn find_request(&self, request_id: i64) -> PaymentResult<Option<Demande>> {
        let row = sqlx::query_as::<_, DemandeRow>(
            r#"
            SELECT d.id::bigint AS id, d.statut, d.utilisateur_id::bigint AS utilisateur_id,
                   d.montant_total, u.prenom, u.nom, u.telephone, u.email
            FROM demandes_demande d
            JOIN utilisateurs_user u ON u.id = d.utilisateur_id
            WHERE d.id = $1
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Demande::from))
    }

    async fn mark_awaiting_processing(&self, request_id: i64) -> PaymentResult<()> {
        let result = sqlx::query(
            "UPDATE demandes_demande SET statut = $2 WHERE id = $1 AND statut = $3",
        )
        .bind(request_id)
        .bind(RequestStatus::AWAITING_PROCESSING)
        .bind(RequestStatus::AWAITING_PAYMENT)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            log::info!("Request {} moved to awaiting processing", request_id);
        } else {
            log::debug!("Request {} was not awaiting payment, left unchanged", request_id);
        }

        Ok(())
    }
}

/// 内存中的申请登记表，用于测试与本地运行
#[derive(Default)]
pub struct MemoryRequestLinkage {
    requests: Mutex<HashMap<i64, Demande>>,
}

impl MemoryRequestLinkage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记或替换一个申请
    pub fn insert(&self, demande: Demande) -> PaymentResult<()> {
        let mut requests = self.lock()?;
        requests.insert(demande.id, demande);
        Ok(())
    }

    /// 当前申请状态
    pub fn status_of(&self, request_id: i64) -> PaymentResult<Option<RequestStatus>> {
        let requests = self.lock()?;
        Ok(requests.get(&request_id).map(|d| d.status.clone()))
    }

    fn lock(&self) -> PaymentResult<std::sync::MutexGuard<'_, HashMap<i64, Demande>>> {
        self.requests
            .lock()
            .map_err(|_| PaymentError::Internal("request registry lock poisoned".to_string()))
    }
}

#[async_trait]
impl RequestLinkage for MemoryRequestLinkage {
    async fn find_request(&self, request_id: i64) -> PaymentResult<Option<Demande>> {
        let requests = self.lock()?;
        Ok(requests.get(&request_id).cloned())
    }

    async fn mark_awaiting_processing(&self, request_id: i64) -> PaymentResult<()> {
        let mut requests = self.lock()?;
        if let Some(demande) = requests.get_mut(&request_id) {
            if demande.is_awaiting_payment() {
                demande.status = RequestStatus::AwaitingProcessing;
            }
        }
        Ok(())
    }
}
