//! Console walkthrough of timeout, retry and composed pipelines.
//!
//! ```text
//! resilience-demo [--time-scale 0.1] [--url https://httpstat.us/503]
//! ```
//!
//! `--time-scale` shrinks every delay and timeout. `--url` additionally runs
//! the HTTP sample: a registry with a `timeout` and an `http` pipeline, the
//! latter used through a delegating executor.

use clap::Parser;
use resilience_pipeline::prelude::*;
use resilience_pipeline::strategies::{DelayGeneratorArguments, RetryEvent};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
#[error("{0}")]
struct InvalidOperation(String);

#[derive(Debug, Error)]
#[error("application failure")]
struct ApplicationFault;

const MAX_TIME_SCALE: f64 = 100.0;

#[derive(Debug, Parser)]
#[command(name = "resilience-demo")]
#[command(about = "Timeout and retry pipeline walkthrough", long_about = None)]
struct DemoArgs {
    /// Multiplier applied to every delay and timeout
    #[arg(long, default_value_t = 1.0, value_parser = parse_time_scale)]
    time_scale: f64,

    /// Also run the HTTP sample against this URL
    #[arg(long)]
    url: Option<String>,
}

fn parse_time_scale(value: &str) -> Result<f64, String> {
    let scale: f64 = value
        .parse()
        .map_err(|e| format!("invalid time scale {value:?}: {e}"))?;
    if scale.is_finite() && scale > 0.0 && scale <= MAX_TIME_SCALE {
        Ok(scale)
    } else {
        Err(format!("time scale must be in (0, {MAX_TIME_SCALE}], got {value}"))
    }
}

impl DemoArgs {
    fn scaled(&self, duration: Duration) -> Duration {
        duration.mul_f64(self.time_scale)
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()?;
    Ok(())
}

async fn timeout_sample(args: &DemoArgs) -> Result<u32, ResilienceError> {
    let pipeline = PipelineBuilder::<u32>::new()
        .with_name("timeout-sample")
        .add_timeout(
            TimeoutOptions::new(args.scaled(Duration::from_secs(5))).with_on_timeout(|event| {
                println!(
                    "Timeout occurred after: {} seconds",
                    event.timeout.as_secs_f64()
                );
            }),
        )
        .build()?;

    let work = args.scaled(Duration::from_secs(10));
    pipeline
        .execute(|_ctx| async move {
            tokio::time::sleep(work).await;
            Ok(42)
        })
        .await
}

fn print_retry(event: &RetryEvent<'_, ()>) {
    println!(
        "Retrying... {} attempt after {:?}",
        event.attempt + 1,
        event.retry_delay
    );
}

async fn retry_sample(args: &DemoArgs) -> Result<(), ResilienceError> {
    let scale = args.time_scale;
    let pipeline = PipelineBuilder::<()>::new()
        .with_name("retry-sample")
        .add_retry(
            RetryOptions::new()
                .with_max_retry_attempts(3)
                .with_delay(args.scaled(Duration::from_secs(2)))
                .with_backoff(BackoffKind::Exponential)
                .with_delay_generator(move |generator_args: &DelayGeneratorArguments<'_, ()>| {
                    exponential_seconds(generator_args).map(|delay| delay.mul_f64(scale))
                })
                .with_should_handle(
                    PredicateBuilder::new()
                        .handle::<ApplicationFault>()
                        .handle_where::<InvalidOperation, _>(|e| e.0 == "Something went wrong"),
                )
                .with_on_retry(print_retry),
        )
        .build()?;

    let work = args.scaled(Duration::from_secs(2));
    pipeline
        .execute(|_ctx| async move {
            println!("Executing...");
            tokio::time::sleep(work).await;
            Err(ResilienceError::operation(InvalidOperation(
                "Something went wrong".to_string(),
            )))
        })
        .await
}

async fn composite_sample(args: &DemoArgs) -> Result<(), ResilienceError> {
    let pipeline = PipelineBuilder::<()>::new()
        .with_name("composite-sample")
        .add_retry(
            RetryOptions::new()
                .with_max_retry_attempts(3)
                .with_delay(args.scaled(Duration::from_secs(2)))
                .with_should_handle(PredicateBuilder::new().handle_kind(FaultKind::Timeout))
                .with_on_retry(print_retry),
        )
        .add_timeout(args.scaled(Duration::from_secs(1)))
        .build()?;

    let work = args.scaled(Duration::from_secs(2));
    pipeline
        .execute(|_ctx| async move {
            println!("Executing...");
            tokio::time::sleep(work).await;
            Err(ResilienceError::operation(InvalidOperation(
                "Something went wrong".to_string(),
            )))
        })
        .await
}

fn build_registry(args: &DemoArgs) -> anyhow::Result<Arc<PipelineRegistry>> {
    let registry = PipelineRegistry::new().with_event_sink(Arc::new(LoggingEventSink::debug()));

    let timeout = args.scaled(Duration::from_secs(2));
    registry.add_pipeline::<Vec<String>, _>("timeout", move |builder, _| {
        builder.add_timeout(TimeoutOptions::new(timeout).with_on_timeout(|event| {
            info!(
                "Timeout occurred after: {} seconds",
                event.timeout.as_secs_f64()
            );
        }));
    })?;

    let scale = args.time_scale;
    registry.add_pipeline::<reqwest::Response, _>("http", move |builder, _| {
        builder.add_retry(
            RetryOptions::new()
                .with_max_retry_attempts(3)
                .with_should_handle(transient_http_errors())
                .retry_after_header()
                .with_delay_generator(move |args: &DelayGeneratorArguments<'_, reqwest::Response>| {
                    exponential_seconds(args).map(|delay| delay.mul_f64(scale))
                })
                .with_on_retry(|event| {
                    info!(
                        "Retrying... {} attempt after {:?}",
                        event.attempt + 1,
                        event.retry_delay
                    );
                }),
        );
    })?;

    Ok(Arc::new(registry))
}

async fn weather_forecast(registry: &PipelineRegistry, args: &DemoArgs) -> anyhow::Result<Vec<String>> {
    let pipeline = registry.get_pipeline::<Vec<String>>("timeout")?;
    let work = args.scaled(Duration::from_secs(4));

    let forecast = pipeline
        .execute(|_ctx| async move {
            tokio::time::sleep(work).await;
            Ok(vec!["Freezing".to_string(), "Mild".to_string(), "Hot".to_string()])
        })
        .await?;
    Ok(forecast)
}

async fn http_sample(registry: Arc<PipelineRegistry>, url: &str) -> anyhow::Result<()> {
    let executor = DelegatingExecutor::new(ReqwestTransport::default(), registry, "http");
    let response = executor.get(url).await?;
    println!("GET {url} -> {}", response.status());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let args = DemoArgs::parse();

    if let Err(e) = timeout_sample(&args).await {
        println!("Unhandled exception: {e}");
    }
    if let Err(e) = retry_sample(&args).await {
        println!("Unhandled exception: {e}");
    }
    if let Err(e) = composite_sample(&args).await {
        println!("Unhandled exception: {e}");
    }

    if let Some(url) = &args.url {
        let registry = build_registry(&args)?;
        match weather_forecast(&registry, &args).await {
            Ok(forecast) => println!("Forecast: {forecast:?}"),
            Err(e) => println!("Unhandled exception: {e}"),
        }
        if let Err(e) = http_sample(registry, url).await {
            println!("Unhandled exception: {e}");
        }
    }

    println!("Done!");
    Ok(())
}
