//! `courier` - drive a mail client's backends from the command line
//!
//! Resolves an account through the credential cache (or the running client),
//! then lists drafts or plans and sends replies. Output is JSON on stdout;
//! logs go to stderr.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod args;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use courier_core::backend::NativeClient;
use courier_core::drafts::{GmailDraftSource, GraphDraftSource, NativeDraftSource};
use courier_core::{
    BackendKind, Config, CredentialStore, DevToolsBridge, DraftAggregationService, DraftSource,
    FilePersistence, GmailClient, GraphClient, MailBackend, OAuthRefresher, Provider,
    ProviderResolver,
};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use args::{Args, Command};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=info,courier_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Args::parse()).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            let reauth = e
                .downcast_ref::<courier_core::Error>()
                .is_some_and(courier_core::Error::requires_reauth);
            error!("{e:#}");
            if reauth {
                eprintln!("Open the mail client and sign in again, then retry.");
            }
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load().await.context("loading configuration")?;
    let http = reqwest::Client::new();

    let persistence = Arc::new(FilePersistence::new(config.credentials_path()));
    let refresher = Arc::new(OAuthRefresher::from_config(&config, &http)?);
    let store = Arc::new(
        CredentialStore::open(persistence, refresher, config.refresh_skew())
            .await
            .context("loading credential cache")?,
    );
    info!(accounts = store.accounts().await.len(), "Credential cache loaded");

    if args.command == Command::Accounts {
        return print_json(&store.accounts().await);
    }

    let bridge = Arc::new(DevToolsBridge::new(http.clone(), config.app_path.clone()));
    let resolver = ProviderResolver::new(Arc::clone(&store), bridge, &config);
    let port = args.port.unwrap_or(config.debug_port);
    let provider = resolver.resolve(args.account.as_deref(), port).await?;

    // A live session must be closed whatever the command's outcome.
    let outcome = execute(&config, &http, &store, &provider, args).await;
    if let Err(e) = provider.disconnect().await {
        warn!("Failed to disconnect from the live client: {e}");
    }
    outcome
}

async fn execute(
    config: &Config,
    http: &reqwest::Client,
    store: &Arc<CredentialStore>,
    provider: &Provider,
    args: Args,
) -> Result<()> {
    let record = provider.credential(args.account.as_deref()).await?;
    let account = record.account_email.clone();

    match args.command {
        Command::Accounts => Ok(()),
        Command::Drafts { limit, offset } => {
            let service = draft_service(config, http, store, record.backend_kind, &account);
            print_json(&service.list_drafts_report(limit, offset).await)
        }
        Command::Reply {
            thread_id,
            mode,
            to,
            body,
        } => {
            let backend = MailBackend::for_kind(record.backend_kind, http.clone(), config);
            let explicit_to = (!to.is_empty()).then_some(to.as_slice());
            let prepared = backend
                .prepare(&record.access_token, &thread_id, mode, explicit_to, Some(account.as_str()))
                .await?;
            match body {
                Some(body) => {
                    let token = provider.get_token(Some(account.as_str())).await?;
                    print_json(&backend.send(&token, &prepared, &body).await?)
                }
                None => print_json(&prepared),
            }
        }
    }
}

fn draft_service(
    config: &Config,
    http: &reqwest::Client,
    store: &Arc<CredentialStore>,
    kind: BackendKind,
    account: &str,
) -> DraftAggregationService {
    let rest: Arc<dyn DraftSource> = match kind {
        BackendKind::Google => Arc::new(GmailDraftSource::new(
            GmailClient::new(http.clone(), &config.gmail_api_base),
            Arc::clone(store),
            account,
        )),
        BackendKind::Microsoft => Arc::new(GraphDraftSource::new(
            GraphClient::new(http.clone(), &config.graph_api_base),
            Arc::clone(store),
            account,
        )),
    };
    let mut service = DraftAggregationService::new(vec![rest]);
    if let Some(base) = &config.native_api_base {
        service = service.with_source(Arc::new(NativeDraftSource::new(
            NativeClient::new(http.clone(), base),
            Arc::clone(store),
            account,
        )));
    }
    service
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
