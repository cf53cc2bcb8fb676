use std::sync::Arc;

use actix_web::{
    get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use tf_controller::collaborators::Collaborators;
use tf_controller::configuration::controller::{self, State};
use tf_controller::defaults::{
    AlwaysDestroy, DefaultBackend, ExclusivityValidator, JobStatusProbe, K8sProviderResolver,
    PassthroughRenderer,
};
use tf_controller::telemetry;
use tf_controller_k8s_util::client::new_client_with_metrics;

use clap::{crate_authors, crate_description, crate_version, Parser};
use kube::Config;
use prometheus_client::registry::Registry;

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(c.metrics())
}

#[get("/healthz")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[derive(Parser, Debug)]
#[command(
    name = "tf-controller",
    about = crate_description!(),
    version = crate_version!(),
    author = crate_authors!("\n"),
)]
struct Args {
    /// Listen on given port
    #[arg(short, long, default_value_t = 8080, env)]
    port: u32,

    /// Set logging filter directive for `tracing_subscriber::filter::EnvFilter`. Example: "info,kube=debug,tf_controller=debug"
    #[arg(long, default_value = "info", env)]
    log_filter: String,

    /// Set log format
    #[arg(long, value_enum, default_value_t = telemetry::LogFormat::Text, env)]
    log_format: telemetry::LogFormat,

    /// URL for the OpenTelemetry tracing endpoint.
    ///
    /// This optional argument specifies the URL to which traces will be sent using
    /// OpenTelemetry. If not provided, tracing will be disabled.
    #[arg(short, long, env = "OPENTELEMETRY_ENDPOINT_URL")]
    tracing_url: Option<String>,

    /// Sampling ratio for tracing.
    ///
    /// Specifies the ratio of traces to sample. A value of `1.0` will sample all traces,
    /// while a lower value will sample fewer traces. The default is `0.1`, meaning 10%
    /// of traces are sampled.
    #[arg(short, long, default_value_t = 0.1, env)]
    sample_ratio: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();

    telemetry::init(
        &args.log_filter,
        args.log_format,
        args.tracing_url.as_deref(),
        args.sample_ratio,
    )
    .await?;

    let mut registry = Registry::with_prefix("tf_controller");
    let config = Config::infer().await?;
    let client = new_client_with_metrics(config, &mut registry).await?;

    let collaborators = Collaborators {
        validator: Arc::new(ExclusivityValidator),
        renderer: Arc::new(PassthroughRenderer),
        deletability: Arc::new(AlwaysDestroy),
        providers: Arc::new(K8sProviderResolver),
        status_probe: Arc::new(JobStatusProbe),
        backend: Arc::new(DefaultBackend),
    };
    let state = State::new(registry, collaborators);

    let server_state = state.clone();
    let controller = controller::run(state, client);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(server_state.clone()))
            .wrap(middleware::Logger::default().exclude("/healthz"))
            .service(health)
            .service(metrics)
    })
    .bind(format!("0.0.0.0:{}", args.port))?
    .shutdown_timeout(5);

    // Both runtimes implement graceful shutdown, so poll until both are done.
    tokio::join!(controller, server.run()).1?;
    Ok(())
}
