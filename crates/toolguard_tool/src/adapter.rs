//! Host for downstream executors, gated on approved verdicts.

use crate::trait_::{Tool, ToolError};
use indexmap::IndexMap;
use std::sync::Arc;
use toolguard_core::{CoreError, ToolCall, Verdict};

/// Error from adapter operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// No executor registered for the tool
    #[error("no executor for tool: {name}")]
    NoExecutor {
        /// Tool name
        name: String,
    },
    /// An executor with this name is already registered
    #[error("executor already registered: {name}")]
    AlreadyRegistered {
        /// Tool name
        name: String,
    },
    /// The verdict does not permit execution of this call
    #[error("call {call_id} is not approved for execution ({status})")]
    NotApproved {
        /// Call identifier
        call_id: String,
        /// Verdict status, or a mismatch note
        status: String,
    },
    /// The executor failed
    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl From<AdapterError> for CoreError {
    fn from(err: AdapterError) -> Self {
        CoreError::Internal {
            message: err.to_string(),
        }
    }
}

/// Registry of executors, dispatched by tool name
#[derive(Clone, Default)]
pub struct ToolHost {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl ToolHost {
    /// Create an empty host
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host with the built-in stub executors
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut host = Self::new();
        for tool in builtin::all() {
            host.tools.insert(tool.name().to_string(), tool);
        }
        host
    }

    /// Register an executor
    ///
    /// # Errors
    ///
    /// Returns error if an executor with the same name exists
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), AdapterError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AdapterError::AlreadyRegistered { name });
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Registered executor names
    #[must_use]
    pub fn list_tools(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Check if an executor is available
    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Execute a call that the engine approved.
    ///
    /// # Errors
    ///
    /// Returns error if the verdict is not an approval of this exact call,
    /// no executor exists, or the executor fails
    pub async fn execute_approved(
        &self,
        call: &ToolCall,
        verdict: &Verdict,
    ) -> Result<String, AdapterError> {
        if verdict.tool_call_id != call.id {
            return Err(AdapterError::NotApproved {
                call_id: call.id.to_string(),
                status: format!("verdict is for {}", verdict.tool_call_id),
            });
        }
        if !verdict.is_approved() || !verdict.execution_allowed {
            return Err(AdapterError::NotApproved {
                call_id: call.id.to_string(),
                status: verdict.status.to_string(),
            });
        }
        if !verdict.approves(call) {
            return Err(AdapterError::NotApproved {
                call_id: call.id.to_string(),
                status: "approval was issued for a different call".to_string(),
            });
        }

        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| AdapterError::NoExecutor {
                name: call.name.clone(),
            })?;

        tracing::info!(call_id = %call.id, tool = %call.name, "executing approved call");
        Ok(tool.execute(call).await?)
    }
}

/// Stub executors for the demo tools
pub mod builtin {
    use super::*;
    use async_trait::async_trait;

    fn text<'a>(call: &'a ToolCall, field: &str) -> Result<&'a str, ToolError> {
        call.parameter(field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::BadArgument {
                field: field.to_string(),
                reason: "expected a string".to_string(),
            })
    }

    fn scalar(call: &ToolCall, field: &str) -> Result<String, ToolError> {
        match call.parameter(field) {
            Some(serde_json::Value::String(s)) => Ok(s.clone()),
            Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
            _ => Err(ToolError::BadArgument {
                field: field.to_string(),
                reason: "expected a string or number".to_string(),
            }),
        }
    }

    /// All built-in stubs
    #[must_use]
    pub fn all() -> Vec<Arc<dyn Tool>> {
        vec![
            Arc::new(WeatherTool),
            Arc::new(TransferTool),
            Arc::new(StockPriceTool),
            Arc::new(FlightTool),
        ]
    }

    /// `get_weather` stub
    pub struct WeatherTool;

    #[async_trait]
    impl Tool for WeatherTool {
        fn name(&self) -> &str {
            "get_weather"
        }

        async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
            let location = text(call, "location")?;
            let units = call
                .parameter("units")
                .and_then(|v| v.as_str())
                .unwrap_or("celsius");
            Ok(format!("Weather in {}: 20° {}", location, units))
        }
    }

    /// `transfer_money` stub
    pub struct TransferTool;

    #[async_trait]
    impl Tool for TransferTool {
        fn name(&self) -> &str {
            "transfer_money"
        }

        async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
            let from = text(call, "from")?;
            let to = text(call, "to")?;
            let amount = scalar(call, "amount")?;
            let currency = call
                .parameter("currency")
                .and_then(|v| v.as_str())
                .unwrap_or("usd");
            Ok(format!(
                "Transferred {} {} from {} to {} (simulated)",
                amount, currency, from, to
            ))
        }
    }

    /// `get_stock_price` stub
    pub struct StockPriceTool;

    #[async_trait]
    impl Tool for StockPriceTool {
        fn name(&self) -> &str {
            "get_stock_price"
        }

        async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
            let symbol = text(call, "symbol")?;
            Ok(format!("Stock price for {}: $123.45 (simulated)", symbol))
        }
    }

    /// `book_flight` stub
    pub struct FlightTool;

    #[async_trait]
    impl Tool for FlightTool {
        fn name(&self) -> &str {
            "book_flight"
        }

        async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
            let from = text(call, "from")?;
            let to = text(call, "to")?;
            let date = text(call, "date")?;
            Ok(format!(
                "Flight booked from {} to {} on {} (simulated)",
                from, to, date
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolguard_core::{RejectReason, ToolCallId};

    fn weather_call() -> ToolCall {
        ToolCall::new("c1", "get_weather")
            .with_parameter("location", json!("Paris"))
            .with_parameter("units", json!("celsius"))
    }

    #[tokio::test]
    async fn test_execute_approved() {
        let host = ToolHost::with_builtins();
        let call = weather_call();
        let output = host
            .execute_approved(&call, &Verdict::approved(&call))
            .await
            .unwrap();
        assert_eq!(output, "Weather in Paris: 20° celsius");
    }

    #[tokio::test]
    async fn test_refuses_rejected_verdict() {
        let host = ToolHost::with_builtins();
        let call = weather_call();
        let verdict = Verdict::rejected(call.id.clone(), RejectReason::HallucinatedValue, "x");
        let err = host.execute_approved(&call, &verdict).await.unwrap_err();
        assert!(matches!(err, AdapterError::NotApproved { .. }));
    }

    #[tokio::test]
    async fn test_refuses_verdict_for_other_call() {
        let host = ToolHost::with_builtins();
        let call = weather_call();
        let verdict = Verdict::approved(&ToolCall::new(ToolCallId::new("other"), "get_weather"));
        let err = host.execute_approved(&call, &verdict).await.unwrap_err();
        assert!(matches!(err, AdapterError::NotApproved { .. }));
    }

    #[tokio::test]
    async fn test_refuses_approval_replayed_on_altered_call() {
        let host = ToolHost::with_builtins();
        let approved = ToolCall::new("c2", "transfer_money")
            .with_parameter("from", json!("savings"))
            .with_parameter("to", json!("checking"))
            .with_parameter("amount", json!(50));
        let verdict = Verdict::approved(&approved);

        let altered = approved.clone().with_parameter("amount", json!(50_000));
        let err = host.execute_approved(&altered, &verdict).await.unwrap_err();
        assert!(matches!(err, AdapterError::NotApproved { .. }));

        let renamed = approved.renamed("get_weather");
        let err = host.execute_approved(&renamed, &verdict).await.unwrap_err();
        assert!(matches!(err, AdapterError::NotApproved { .. }));

        assert!(host.execute_approved(&approved, &verdict).await.is_ok());
    }

    #[tokio::test]
    async fn test_transfer_stub_and_bad_argument() {
        let host = ToolHost::with_builtins();
        let call = ToolCall::new("c2", "transfer_money")
            .with_parameter("from", json!("savings"))
            .with_parameter("to", json!("checking"))
            .with_parameter("amount", json!(500));
        let output = host
            .execute_approved(&call, &Verdict::approved(&call))
            .await
            .unwrap();
        assert_eq!(output, "Transferred 500 usd from savings to checking (simulated)");

        let call = ToolCall::new("c3", "get_stock_price");
        let err = host
            .execute_approved(&call, &Verdict::approved(&call))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Tool(ToolError::BadArgument { .. })));
    }

    #[test]
    fn test_register_duplicate() {
        let mut host = ToolHost::with_builtins();
        assert_eq!(host.list_tools().len(), 4);
        let result = host.register(Arc::new(builtin::WeatherTool));
        assert!(matches!(result, Err(AdapterError::AlreadyRegistered { .. })));
    }

    #[tokio::test]
    async fn test_missing_executor() {
        let host = ToolHost::new();
        let call = weather_call();
        let err = host
            .execute_approved(&call, &Verdict::approved(&call))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::NoExecutor { .. }));
    }
}
