use std::{env, str::FromStr};

use anyhow::{bail, Context, Result};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    resource::Resource,
    runtime::Tokio,
    trace::{self, Sampler},
};
use tracing::{info, warn};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const SAMPLING_RATE_VAR: &str = "ALBUM_OTEL_SAMPLING_RATE";
const LOG_FORMAT_VAR: &str = "ALBUM_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => bail!("unknown log format '{other}' (expected text or json)"),
        }
    }
}

/// Flushes the OTLP pipeline when dropped.
#[derive(Debug)]
pub struct TelemetryGuard {
    tracer_installed: bool,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.tracer_installed {
            global::shutdown_tracer_provider();
        }
    }
}

pub fn init(service_name: &str) -> Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (sampling_rate, sampling_warning) =
        parse_sampling_rate(env::var(SAMPLING_RATE_VAR).ok().as_deref());

    let mut warnings: Vec<String> = sampling_warning.into_iter().collect();
    let format = match env::var(LOG_FORMAT_VAR) {
        Ok(raw) => raw.parse().unwrap_or_else(|err: anyhow::Error| {
            warnings.push(format!("{LOG_FORMAT_VAR}: {err}; using text"));
            LogFormat::Text
        }),
        Err(_) => LogFormat::default(),
    };

    let (otel_layer, otel_error) = match build_otel_layer(service_name, sampling_rate) {
        Ok(layer) => (layer, None),
        Err(error) => (None, Some(error)),
    };
    let tracer_installed = otel_layer.is_some();

    let (json_layer, text_layer) = match format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Text => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    for message in warnings {
        warn!("{message}");
    }
    if let Some(error) = otel_error {
        warn!(%error, "failed to initialize OTEL exporter; continuing with console logs only");
    }
    info!(sampling_rate, ?format, "telemetry configured");

    Ok(TelemetryGuard { tracer_installed })
}

fn build_otel_layer(
    service_name: &str,
    sampling_rate: f64,
) -> Result<Option<OpenTelemetryLayer<Registry, trace::Tracer>>> {
    if sampling_rate <= 0.0 {
        return Ok(None);
    }

    global::set_text_map_propagator(TraceContextPropagator::new());

    let exporter = opentelemetry_otlp::new_exporter().tonic();
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(
            trace::Config::default()
                .with_sampler(Sampler::TraceIdRatioBased(sampling_rate))
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    service_name.to_string(),
                )])),
        )
        .with_exporter(exporter)
        .install_batch(Tokio)?;

    Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
}

/// Parses the trace sampling ratio. Unset means tracing export is off;
/// garbage falls back to off and out-of-range values are clamped, each with a
/// warning for the caller to log once the subscriber is up.
pub fn parse_sampling_rate(raw: Option<&str>) -> (f64, Option<String>) {
    let Some(value) = raw else {
        return (0.0, None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return (
            0.0,
            Some(format!("{SAMPLING_RATE_VAR} is empty; OTEL export disabled")),
        );
    }

    match trimmed.parse::<f64>() {
        Ok(parsed) if parsed.is_nan() => (
            0.0,
            Some(format!("{SAMPLING_RATE_VAR}=NaN; OTEL export disabled")),
        ),
        Ok(parsed) if (0.0..=1.0).contains(&parsed) => (parsed, None),
        Ok(parsed) => {
            let clamped = parsed.clamp(0.0, 1.0);
            (
                clamped,
                Some(format!(
                    "{SAMPLING_RATE_VAR}={trimmed} outside 0.0..=1.0; clamped to {clamped}"
                )),
            )
        }
        Err(_) => (
            0.0,
            Some(format!(
                "{SAMPLING_RATE_VAR}='{trimmed}' is not a valid float; OTEL export disabled"
            )),
        ),
    }
}
