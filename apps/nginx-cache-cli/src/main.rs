use anyhow::Context;
use clap::{Parser, Subcommand};
use nginx_cache_core::config::CONFIG_ENV;
use nginx_cache_core::{
    logging, JsonFileSettings, LocalFilesystemProvider, NonceIssuer,
    PurgeController, PurgeObserver, SettingsStore, TriggerContext, ValidationResult,
};
use nginx_cache_hooks::{
    register_auto_purge, AdminActions, AdminQuery, HookRegistry, HostApi, Notice, NoticeLevel,
    PermissionSet, Principal, PurgeActions,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "nginx-cache",
    about = "Validate and purge an Nginx FastCGI/proxy/uWSGI cache zone",
    version
)]
struct Cli {
    /// Settings file
    #[arg(long, env = CONFIG_ENV, default_value = "nginx-cache.json")]
    config: PathBuf,

    /// Account the command runs as
    #[arg(long, default_value = "operator")]
    principal: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the configured zone and whether it can be purged
    Status,

    /// Purge the zone now, as an operator would from the admin bar
    Purge,

    /// Change settings
    Set {
        /// Cache zone path
        #[arg(long)]
        path: Option<String>,

        /// Purge automatically when content changes
        #[arg(long)]
        auto_purge: Option<bool>,
    },

    /// Fire content-change events within one triggering context
    Fire {
        #[arg(required = true)]
        events: Vec<String>,
    },
}

struct ConsoleHost {
    settings: Arc<JsonFileSettings>,
    principal: Principal,
}

impl HostApi for ConsoleHost {
    fn settings(&self) -> Arc<dyn SettingsStore> {
        self.settings.clone()
    }

    fn current_principal(&self) -> Option<Principal> {
        Some(self.principal.clone())
    }

    fn notify(&self, notice: &Notice) {
        let label = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Info => "info",
            NoticeLevel::Error => "error",
        };
        println!("[{label}] {}", notice.text);
    }
}

fn main() {
    logging::init_logging();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        let chain = err
            .chain()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n  caused by: ");
        tracing::error!(error = %chain, "command failed");
        eprintln!("error: {chain}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Arc::new(
        JsonFileSettings::open(&cli.config)
            .with_context(|| format!("failed to open {}", cli.config.display()))?,
    );
    let cfg = settings.snapshot();

    let registry = Arc::new(HookRegistry::new());
    let mut controller = PurgeController::new(settings.clone(), Arc::new(LocalFilesystemProvider));
    if let Ok(secret) = cfg.require_nonce_secret() {
        controller = controller.with_nonces(NonceIssuer::new(secret, cfg.security.nonce_lifetime_secs));
    }
    controller.add_observer(registry.clone() as Arc<dyn PurgeObserver>);
    let controller = Arc::new(controller);

    let host = ConsoleHost {
        settings: settings.clone(),
        principal: Principal::new(cli.principal, PermissionSet::administrator()),
    };
    let admin = AdminActions::new(Arc::clone(&controller));

    match cli.command {
        Command::Status => {
            let zone = settings.cache_zone_config();
            println!("config:     {}", settings.path().display());
            println!(
                "path:       {}",
                if zone.path.is_empty() { "(not set)" } else { zone.path.as_str() }
            );
            println!("auto purge: {}", if zone.auto_purge { "on" } else { "off" });
            match controller.check() {
                ValidationResult::Valid => println!("[ok] cache zone can be purged"),
                ValidationResult::Invalid(_) => {
                    admin.show_notices(&AdminQuery::default(), &host);
                }
            }
        }
        Command::Purge => {
            cfg.require_nonce_secret()?;
            let link = admin
                .purge_link(&host.principal)
                .context("principal cannot purge the cache")?;
            let query = AdminQuery::parse(link.split_once('?').map_or("", |(_, q)| q));
            let redirect = admin
                .handle(&query, &host)?
                .context("purge action was not recognised")?;
            tracing::debug!(location = %redirect.location, "redirect");
            let landing = AdminQuery::parse(redirect.location.split_once('?').map_or("", |(_, q)| q));
            admin.show_notices(&landing, &host);
            if landing.get("message") != Some(nginx_cache_hooks::admin::MESSAGE_PURGED) {
                anyhow::bail!("cache could not be purged");
            }
        }
        Command::Set { path, auto_purge } => {
            if path.is_none() && auto_purge.is_none() {
                anyhow::bail!("nothing to set; pass --path and/or --auto-purge");
            }
            admin.update_settings(&host, path.as_deref(), auto_purge)?;
            admin.show_notices(&AdminQuery::parse("settings-updated=true"), &host);
            println!("[ok] settings saved to {}", settings.path().display());
        }
        Command::Fire { events } => {
            let actions = PurgeActions::from_config(cfg.purge_actions.as_deref());
            let subscribed = register_auto_purge(&registry, &controller, &actions);
            if subscribed == 0 {
                println!("[info] auto purge is off; events ignored");
                return Ok(());
            }
            let purged = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&purged);
            registry.add_action("nginx_cache/after_purge", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

            let ctx = TriggerContext::new("cli");
            for event in &events {
                let ran = registry.do_action(event, Some(&ctx));
                if ran == 0 {
                    println!("[info] {event} does not trigger a purge");
                }
            }
            if purged.load(Ordering::SeqCst) > 0 {
                println!("[ok] cache zone purged once for {} event(s)", events.len());
            } else if ctx.guard().is_completed() {
                admin.show_notices(&AdminQuery::default(), &host);
                anyhow::bail!("automatic purge did not complete");
            }
        }
    }
    Ok(())
}
