use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

const RPC_TIMEOUT: Duration = Duration::from_secs(3);

/// Thin RPC client to the external Balance/Rating service. Grounded on
/// `internal/adapter/grpc/users/user.go`'s four-operation `ClientPresenter` contract; the
/// transport is HTTP/JSON via `reqwest` rather than gRPC (see SPEC_FULL.md §6.2).
#[async_trait]
pub trait BalanceRatingClient: Send + Sync {
    async fn get_balance(&self, user_id: &str) -> CoreResult<i64>;
    async fn add_balance(&self, user_id: &str, delta: i64) -> CoreResult<()>;
    async fn subtract_balance(&self, user_id: &str, delta: i64) -> CoreResult<()>;
    async fn get_rating(&self, user_id: &str) -> CoreResult<i64>;
}

#[derive(Debug, Serialize)]
struct BalanceDelta {
    user_id: String,
    delta: i64,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: i64,
}

#[derive(Debug, Deserialize)]
struct RatingResponse {
    rating: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct HttpBalanceRatingClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBalanceRatingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .expect("reqwest client builds with a fixed, valid configuration");
        HttpBalanceRatingClient {
            base_url: base_url.into(),
            http,
        }
    }

    async fn upstream_error(resp: reqwest::Response) -> CoreError {
        let status = resp.status();
        let message = resp
            .json::<ErrorBody>()
            .await
            .map(|b| b.message)
            .unwrap_or_else(|_| status.to_string());
        if status.as_u16() == 409 {
            CoreError::InsufficientFunds
        } else {
            CoreError::Upstream(message)
        }
    }
}

#[async_trait]
impl BalanceRatingClient for HttpBalanceRatingClient {
    async fn get_balance(&self, user_id: &str) -> CoreResult<i64> {
        let resp = self
            .http
            .get(format!("{}/users/{user_id}/balance", self.base_url))
            .send()
            .await
            .map_err(|e| CoreError::Upstream(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::upstream_error(resp).await);
        }
        let body: BalanceResponse = resp.json().await.map_err(|e| CoreError::Upstream(e.to_string()))?;
        Ok(body.balance)
    }

    async fn add_balance(&self, user_id: &str, delta: i64) -> CoreResult<()> {
        let resp = self
            .http
            .post(format!("{}/users/{user_id}/balance/add", self.base_url))
            .json(&BalanceDelta {
                user_id: user_id.to_string(),
                delta,
            })
            .send()
            .await
            .map_err(|e| CoreError::Upstream(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::upstream_error(resp).await);
        }
        Ok(())
    }

    async fn subtract_balance(&self, user_id: &str, delta: i64) -> CoreResult<()> {
        let resp = self
            .http
            .post(format!("{}/users/{user_id}/balance/subtract", self.base_url))
            .json(&BalanceDelta {
                user_id: user_id.to_string(),
                delta,
            })
            .send()
            .await
            .map_err(|e| CoreError::Upstream(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::upstream_error(resp).await);
        }
        Ok(())
    }

    async fn get_rating(&self, user_id: &str) -> CoreResult<i64> {
        let resp = self
            .http
            .get(format!("{}/users/{user_id}/rating", self.base_url))
            .send()
            .await
            .map_err(|e| CoreError::Upstream(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::upstream_error(resp).await);
        }
        let body: RatingResponse = resp.json().await.map_err(|e| CoreError::Upstream(e.to_string()))?;
        Ok(body.rating)
    }
}
