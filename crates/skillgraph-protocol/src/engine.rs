//! BAP-side protocol engine.
//!
//! Every outbound call follows the same pattern: validate locally, log an
//! `initiated` row, acknowledge immediately, then hand the network call to
//! the [`Dispatcher`]. The ACK/NACK depends only on local validation and on
//! whether the dispatch queue has room; a slow provider never holds up the
//! caller. The
//! provider's real answer arrives later as an `on_*` callback, which callers
//! discover through [`BapEngine::get_result`].

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use skillgraph_core::{Action, Role, TransactionLog, TransactionStatus};
use skillgraph_store::Store;

use crate::dispatcher::{DispatchJob, DispatchTicket, Dispatcher};
use crate::error::{ProtocolError, Result};
use crate::messages::{envelope, AckResponse, BapIdentity, Context, SearchIntent};

/// Where outbound calls go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BapConfig {
    pub identity: BapIdentity,
    /// Target provider.
    pub bpp_uri: Option<String>,
    /// Searches go here instead of the provider when set.
    pub gateway_uri: Option<String>,
}

/// Immediate answer to an outbound call.
#[derive(Debug)]
pub struct OutboundAck {
    pub response: AckResponse,
    /// Present only when the call was queued.
    pub ticket: Option<DispatchTicket>,
}

impl OutboundAck {
    fn nack(error: impl Into<String>, context: Context) -> Self {
        Self {
            response: AckResponse::nack(error).with_context(context),
            ticket: None,
        }
    }

    pub fn is_ack(&self) -> bool {
        self.response.is_ack()
    }
}

/// Polling answer for an asynchronous exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PollResult {
    Pending,
    Completed { results: Value },
}

/// The requester side of the protocol.
pub struct BapEngine {
    config: BapConfig,
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
}

impl BapEngine {
    pub fn new(config: BapConfig, store: Arc<dyn Store>, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            store,
            dispatcher,
        }
    }

    pub fn config(&self) -> &BapConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Outbound
    // ─────────────────────────────────────────────────────────────────────

    /// Discover providers for a skill.
    pub async fn search(&self, intent: Option<SearchIntent>) -> Result<OutboundAck> {
        let context = self.context(Action::Search, None);
        let Some(intent) = intent else {
            return self.reject(context, "search requires an intent").await;
        };
        let target = self
            .config
            .gateway_uri
            .as_deref()
            .or(self.config.bpp_uri.as_deref());
        self.send(context, intent.to_message(), target).await
    }

    /// Choose items from a provider's catalog.
    pub async fn select(
        &self,
        provider_id: &str,
        items: Vec<Value>,
        transaction_id: Option<String>,
    ) -> Result<OutboundAck> {
        let context = self.context(Action::Select, transaction_id);
        if provider_id.trim().is_empty() {
            return self.reject(context, "select requires a provider id").await;
        }
        if items.is_empty() {
            return self.reject(context, "select requires at least one item").await;
        }
        let message = json!({ "order": { "provider": { "id": provider_id }, "items": items } });
        let target = self.config.bpp_uri.clone();
        self.send(context, message, target.as_deref()).await
    }

    /// Place a verification order.
    pub async fn confirm(
        &self,
        order: Option<Value>,
        transaction_id: Option<String>,
    ) -> Result<OutboundAck> {
        let context = self.context(Action::Confirm, transaction_id);
        let order = match order {
            Some(order @ Value::Object(_)) => order,
            _ => return self.reject(context, "confirm requires an order object").await,
        };
        let target = self.config.bpp_uri.clone();
        self.send(context, json!({ "order": order }), target.as_deref())
            .await
    }

    /// Ask for an order's status.
    pub async fn status(
        &self,
        order_id: Option<&str>,
        transaction_id: Option<String>,
    ) -> Result<OutboundAck> {
        let context = self.context(Action::Status, transaction_id);
        let Some(order_id) = order_id.filter(|id| !id.trim().is_empty()) else {
            return self.reject(context, "status requires an order id").await;
        };
        let target = self.config.bpp_uri.clone();
        self.send(context, json!({ "order_id": order_id }), target.as_deref())
            .await
    }

    /// Raise a support request.
    pub async fn support(
        &self,
        ref_id: Option<&str>,
        transaction_id: Option<String>,
    ) -> Result<OutboundAck> {
        let context = self.context(Action::Support, transaction_id);
        let Some(ref_id) = ref_id.filter(|id| !id.trim().is_empty()) else {
            return self.reject(context, "support requires a ref id").await;
        };
        let target = self.config.bpp_uri.clone();
        self.send(context, json!({ "ref_id": ref_id }), target.as_deref())
            .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────

    /// Record a provider callback. Signature checks happen before this.
    pub async fn handle_callback(&self, action: Action, payload: &Value) -> Result<AckResponse> {
        if !action.is_callback() {
            return Err(ProtocolError::InvalidRequest(format!(
                "{} is not a callback action",
                action
            )));
        }
        let context = payload.get("context").unwrap_or(&Value::Null);
        let field = |name: &str| {
            context
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    ProtocolError::InvalidRequest(format!("callback context missing {}", name))
                })
        };
        let transaction_id = field("transaction_id")?;
        let message_id = field("message_id")?;

        self.store
            .append_transaction_log(&TransactionLog {
                transaction_id: transaction_id.clone(),
                message_id,
                action,
                role: Role::Bpp,
                request: Value::Null,
                response: Some(payload.clone()),
                status: TransactionStatus::Ack,
                error: None,
                timestamp: Utc::now(),
            })
            .await?;

        tracing::info!(%transaction_id, %action, "received callback");
        Ok(AckResponse::ack())
    }

    /// Latest provider answer for `(transaction_id, action)`.
    ///
    /// Accepts either the request action or its callback.
    pub async fn get_result(&self, transaction_id: &str, action: Action) -> Result<PollResult> {
        let latest = self
            .store
            .latest_transaction_log(transaction_id, action.callback(), Role::Bpp)
            .await?;
        Ok(match latest.and_then(|log| log.response) {
            Some(results) => PollResult::Completed { results },
            None => PollResult::Pending,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn context(&self, action: Action, transaction_id: Option<String>) -> Context {
        Context::new(&self.config.identity, action, transaction_id, Utc::now())
    }

    async fn reject(&self, context: Context, error: &str) -> Result<OutboundAck> {
        tracing::warn!(action = %context.action, transaction_id = %context.transaction_id, error, "rejecting outbound call");
        self.log(&context, envelope(&context, Value::Null), TransactionStatus::Failed, Some(error))
            .await?;
        Ok(OutboundAck::nack(error, context))
    }

    async fn send(
        &self,
        context: Context,
        message: Value,
        base_uri: Option<&str>,
    ) -> Result<OutboundAck> {
        let Some(base_uri) = base_uri else {
            return self.reject(context, "no provider endpoint configured").await;
        };

        let payload = envelope(&context, message);
        self.log(&context, payload.clone(), TransactionStatus::Initiated, None)
            .await?;

        let url = format!("{}/{}", base_uri.trim_end_matches('/'), context.action);
        tracing::info!(action = %context.action, transaction_id = %context.transaction_id, %url, "queueing outbound call");
        let submitted = self.dispatcher.try_submit(DispatchJob {
            url,
            payload: payload.clone(),
            transaction_id: context.transaction_id.clone(),
            message_id: context.message_id.clone(),
            action: context.action,
        });
        let ticket = match submitted {
            Ok(ticket) => ticket,
            Err(ProtocolError::QueueFull) => {
                let error = "dispatch queue full";
                tracing::warn!(action = %context.action, transaction_id = %context.transaction_id, "dispatch queue full, rejecting outbound call");
                self.log(&context, payload, TransactionStatus::Failed, Some(error))
                    .await?;
                return Ok(OutboundAck::nack(error, context));
            }
            Err(e) => return Err(e),
        };

        Ok(OutboundAck {
            response: AckResponse::ack().with_context(context),
            ticket: Some(ticket),
        })
    }

    async fn log(
        &self,
        context: &Context,
        request: Value,
        status: TransactionStatus,
        error: Option<&str>,
    ) -> Result<()> {
        self.store
            .append_transaction_log(&TransactionLog {
                transaction_id: context.transaction_id.clone(),
                message_id: context.message_id.clone(),
                action: context.action,
                role: Role::Bap,
                request,
                response: None,
                status,
                error: error.map(str::to_string),
                timestamp: Utc::now(),
            })
            .await?;
        Ok(())
    }
}
