//! Order flow: validate, process and notify
//!
//! Run with: cargo run -p maestro --example order_flow
//!
//! Set `RUST_LOG=maestro=debug` for engine logs and `MAESTRO_*` variables
//! (or a `.env` file) to tune the runtime.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use maestro::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Checks the order payload seeded into the context
struct ValidateOrder;

#[async_trait]
impl Step for ValidateOrder {
    async fn execute(&self, _scope: StepScope, ctx: WorkflowContext) -> StepResult {
        let amount = ctx
            .get("amount")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| StepError::non_retryable("order has no amount").with_type("INVALID_ORDER"))?;

        if amount <= 0.0 {
            return Err(StepError::non_retryable(format!("invalid amount {amount}"))
                .with_type("INVALID_ORDER"));
        }

        ctx.insert("validated", json!(true));
        Ok(json!({ "amount": amount }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("Loaded .env from {}", path.display());
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maestro=info,order_flow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let engine = Arc::new(WorkflowEngine::new());
    engine.subscribe(TracingObserver);

    engine.register_step("validate", ValidateOrder);

    // Fails once to show the retry policy at work
    let attempts = Arc::new(parking_lot::Mutex::new(0u32));
    engine.register("process", move |scope: StepScope, ctx: WorkflowContext| {
        let attempts = attempts.clone();
        async move {
            let attempt = {
                let mut attempts = attempts.lock();
                *attempts += 1;
                *attempts
            };
            if attempt == 1 {
                return Err(StepError::retryable("payment gateway busy"));
            }

            match scope.sleep(Duration::from_millis(200)).await {
                Ok(()) => {}
                Err(reason) => return Err(StepError::from(reason)),
            }

            let order_id = ctx.get("order_id").unwrap_or(Value::Null);
            ctx.insert("payment_ref", json!(format!("pay-{}", attempt)));
            Ok(json!({ "order_id": order_id, "charged": true }))
        }
    });

    engine.register("notify", |_scope, ctx: WorkflowContext| async move {
        let payment_ref = ctx.get("payment_ref").unwrap_or(Value::Null);
        tracing::info!(%payment_ref, "sending confirmation email");
        Ok(json!("notified"))
    });

    let definition = WorkflowDefinition::builder("order-flow", "Order flow", "Validate, charge and notify")
        .step(StepDefinition::new("validate", "Validate order", StepKind::Task))
        .step(
            StepDefinition::new("process", "Charge payment", StepKind::Process)
                .with_timeout(Duration::from_secs(5))
                .with_retry_policy(
                    RetryPolicy::exponential()
                        .with_max_attempts(3)
                        .with_initial_interval(Duration::from_millis(100)),
                ),
        )
        .step(StepDefinition::new("notify", "Notify customer", StepKind::Task))
        .auto_link()
        .build()?;
    definition.validate()?;

    let context = WorkflowContext::new();
    context.insert("order_id", json!("A-1042"));
    context.insert("amount", json!(99.5));

    let runtime = WorkflowRuntime::new(engine, Arc::new(definition))
        .with_config(RuntimeConfig::from_env())
        .with_context(context);

    runtime.start(&StepScope::new()).await?;

    let state = runtime.state_snapshot();
    tracing::info!(
        run_id = %state.run_id,
        status = %state.status,
        duration_ms = state.duration().map(|d| d.num_milliseconds()),
        "workflow finished"
    );
    println!("{}", serde_json::to_string_pretty(&state.results)?);

    Ok(())
}
