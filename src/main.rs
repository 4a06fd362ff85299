#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::mpsc;
use tracing::{info, warn};

use tabload::api::{ApiClient, DownloadRequest, ModelGateway, RepoType, split_patterns};
use tabload::config::preset::is_builtin;
use tabload::config::{PresetStore, SettingsStore, config_dir};
use tabload::connection::{ConnectOutcome, SharedEndpoint, spawn_connect};
use tabload::constants::{config, defaults, env};
use tabload::fields::FieldState;
use tabload::session::EditSession;
use tabload::templates::{TemplateLibrary, merged_names};
use tabload::logging;

#[derive(Debug, Parser)]
#[command(name = "tabload", version, about = "Preset-driven model loading for TabbyAPI servers")]
struct Cli {
    /// Directory holding config.json, presets.json and templates/
    #[arg(long, value_name = "DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Server base URL (overrides the settings)
    #[arg(long, value_name = "URL", global = true)]
    api_url: Option<String>,

    /// Admin key sent as X-api-key (falls back to TABLOAD_ADMIN_KEY)
    #[arg(long, value_name = "KEY", global = true)]
    admin_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage named presets
    Presets {
        #[command(subcommand)]
        action: PresetCommand,
    },
    /// Show or change application settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
    /// Manage prompt templates
    Templates {
        #[command(subcommand)]
        action: TemplateCommand,
    },
    /// Inspect, load and unload models
    Models {
        #[command(subcommand)]
        action: ModelCommand,
    },
    /// Inspect, load and unload LoRAs
    Loras {
        #[command(subcommand)]
        action: LoraCommand,
    },
    /// Server-side sampler override presets
    Overrides {
        #[command(subcommand)]
        action: OverrideCommand,
    },
    /// Download a Hugging Face repository on the server
    Download(DownloadArgs),
    /// Check a server and remember it as the last connected one
    Connect {
        /// Server base URL (defaults to the configured one)
        url: Option<String>,
    },
}

/// Parameter assignments shared by the commands that build a parameter set
#[derive(Debug, Args)]
struct ParamArgs {
    /// Set a parameter, e.g. --set max_seq_len=8192 (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    sets: Vec<String>,

    #[arg(long)]
    enable_auto_split: bool,

    #[arg(long)]
    fasttensors: bool,
}

impl ParamArgs {
    fn apply(&self, fields: &mut FieldState) -> Result<()> {
        for assignment in &self.sets {
            fields.assign(assignment)?;
        }
        if self.enable_auto_split {
            fields.gpu_split_auto = true;
        }
        if self.fasttensors {
            fields.fasttensors = true;
        }
        Ok(())
    }
}

#[derive(Debug, Subcommand)]
enum PresetCommand {
    List,
    Show {
        name: String,
    },
    Save {
        name: String,
        /// Start from an existing preset instead of the default parameters
        #[arg(long, value_name = "PRESET")]
        from: Option<String>,
        #[command(flatten)]
        params: ParamArgs,
    },
    Delete {
        name: String,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    Show,
    SetUrl { url: String },
    AutoConnect {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Update the parameters a blank session starts from
    SaveDefaults {
        #[command(flatten)]
        params: ParamArgs,
    },
}

#[derive(Debug, Subcommand)]
enum TemplateCommand {
    List {
        /// Include templates available on the server
        #[arg(long)]
        server: bool,
    },
    Add {
        name: String,
        file: PathBuf,
        /// Also save the template on the server
        #[arg(long)]
        upload: bool,
    },
    Remove {
        name: String,
    },
    /// Switch the server to a prompt template
    Use {
        name: String,
    },
    Unload,
}

#[derive(Debug, Subcommand)]
enum ModelCommand {
    List,
    Drafts,
    Current,
    Load {
        model: String,
        #[arg(long, value_name = "NAME")]
        preset: Option<String>,
        #[command(flatten)]
        params: ParamArgs,
    },
    Unload,
}

#[derive(Debug, Subcommand)]
enum LoraCommand {
    List,
    Current,
    Load {
        #[arg(required = true)]
        names: Vec<String>,
        /// Scaling per LoRA, in the same order (defaults to 1.0 for all)
        #[arg(long = "scaling", value_name = "F")]
        scalings: Vec<f64>,
    },
    Unload,
}

#[derive(Debug, Subcommand)]
enum OverrideCommand {
    List,
    Switch { name: String },
    Unload,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RepoKind {
    Model,
    Lora,
}

impl From<RepoKind> for RepoType {
    fn from(kind: RepoKind) -> Self {
        match kind {
            RepoKind::Model => RepoType::Model,
            RepoKind::Lora => RepoType::Lora,
        }
    }
}

#[derive(Debug, Args)]
struct DownloadArgs {
    #[arg(required_unless_present = "cancel")]
    repo_id: Option<String>,

    #[arg(long, default_value = "main")]
    revision: String,

    #[arg(long, value_enum, default_value_t = RepoKind::Model)]
    repo_type: RepoKind,

    #[arg(long, default_value = "")]
    folder_name: String,

    /// Hugging Face access token
    #[arg(long, default_value = "")]
    token: String,

    /// Comma-separated glob patterns to include
    #[arg(long, default_value = "")]
    include: String,

    /// Comma-separated glob patterns to exclude
    #[arg(long, default_value = "")]
    exclude: String,

    /// Cancel the running download instead
    #[arg(long, conflicts_with = "repo_id")]
    cancel: bool,
}

/// Stores and connection details for one invocation
struct App {
    settings: SettingsStore,
    presets: PresetStore,
    templates: TemplateLibrary,
    api_url: Option<String>,
    admin_key: String,
}

impl App {
    fn open(cli: &Cli) -> Result<Self> {
        let dir = cli.config_dir.clone().unwrap_or_else(config_dir);
        info!(dir = %dir.display(), "Using config directory");

        let settings = SettingsStore::load_from(dir.join(config::SETTINGS_FILENAME))
            .context("Failed to load settings")?;
        let admin_key = cli
            .admin_key
            .clone()
            .or_else(|| std::env::var(env::ADMIN_KEY).ok())
            .unwrap_or_default();

        Ok(Self {
            settings,
            presets: PresetStore::open(dir.join(config::PRESETS_FILENAME)),
            templates: TemplateLibrary::new(dir.join(config::TEMPLATES_DIR)),
            api_url: cli.api_url.clone(),
            admin_key,
        })
    }

    /// Explicit flag, else the auto-connect target, else the configured URL
    fn server_url(&self) -> String {
        let settings = self.settings.settings();
        match &self.api_url {
            Some(url) => url.clone(),
            None if settings.auto_connect => settings.auto_connect_target().to_string(),
            None => settings.api_url.clone(),
        }
    }

    fn client(&self) -> Result<ApiClient> {
        let url = self.server_url();
        ApiClient::new(&url, &self.admin_key)
            .with_context(|| format!("Failed to create API client for {url}"))
    }

    fn blank_session(&self) -> EditSession {
        EditSession::blank(&self.settings.settings().default_params)
    }
}

fn print_list(items: &[String], empty: &str) {
    if items.is_empty() {
        println!("{empty}");
    }
    for item in items {
        println!("{item}");
    }
}

/// Built-ins are marked unless a saved preset replaced them
fn preset_label(name: &str, saved: &[String]) -> String {
    if is_builtin(name) && !saved.iter().any(|s| s == name) {
        format!("{name} (built-in)")
    } else {
        name.to_string()
    }
}

fn run_presets(app: &App, action: PresetCommand) -> Result<()> {
    match action {
        PresetCommand::List => {
            let saved = app.presets.saved_names()?;
            for preset in app.presets.list()? {
                println!("{}", preset_label(&preset.name, &saved));
            }
        }
        PresetCommand::Show { name } => {
            let preset = app.presets.get(&name)?;
            println!("{}", serde_json::to_string_pretty(&preset)?);
        }
        PresetCommand::Save { name, from, params } => {
            let mut session = app.blank_session();
            if let Some(base) = from {
                let preset = app
                    .presets
                    .get(&base)
                    .with_context(|| format!("Cannot start from preset '{base}'"))?;
                session.apply_preset(&preset);
            }
            params.apply(&mut session.fields)?;
            app.presets.save(&session.snapshot(&name))?;
            println!("Saved preset '{name}'");
        }
        PresetCommand::Delete { name } => {
            app.presets.delete(&name)?;
            println!("Deleted preset '{name}'");
        }
    }
    Ok(())
}

fn run_settings(app: &mut App, action: SettingsCommand) -> Result<()> {
    match action {
        SettingsCommand::Show => {
            println!("{}", serde_json::to_string_pretty(app.settings.settings())?);
            println!("# file: {}", app.settings.path().display());
        }
        SettingsCommand::SetUrl { url } => {
            app.settings.set_api_url(&url)?;
            println!("API URL set to {}", app.settings.settings().api_url);
        }
        SettingsCommand::AutoConnect { enabled } => {
            app.settings.set_auto_connect(enabled)?;
            println!("Auto-connect {}", if enabled { "enabled" } else { "disabled" });
        }
        SettingsCommand::SaveDefaults { params } => {
            let mut fields = FieldState::from_params(&app.settings.settings().default_params);
            params.apply(&mut fields)?;
            app.settings.set_default_params(fields.to_params())?;
            println!("Default parameters saved");
        }
    }
    Ok(())
}

fn run_templates(app: &App, action: TemplateCommand) -> Result<()> {
    match action {
        TemplateCommand::List { server } => {
            let local: Vec<String> = app.templates.list_local().into_keys().collect();
            let remote = if server {
                app.client()?.templates()?
            } else {
                Vec::new()
            };
            print_list(&merged_names(&local, &remote), "No templates");
        }
        TemplateCommand::Add { name, file, upload } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read template file: {:?}", file))?;
            let path = app.templates.save(&name, &content)?;
            println!("Saved template '{name}' to {}", path.display());
            if upload {
                app.client()?.save_template(&name, &content)?;
                println!("Uploaded template '{name}'");
            }
        }
        TemplateCommand::Remove { name } => {
            app.templates.delete(&name)?;
            println!("Removed template '{name}'");
        }
        TemplateCommand::Use { name } => {
            app.client()?.switch_template(&name)?;
            println!("Switched to template '{name}'");
        }
        TemplateCommand::Unload => {
            app.client()?.unload_template()?;
            println!("Template unloaded");
        }
    }
    Ok(())
}

fn run_models(app: &App, action: ModelCommand) -> Result<()> {
    match action {
        ModelCommand::List => print_list(&app.client()?.models()?, "No models"),
        ModelCommand::Drafts => print_list(&app.client()?.draft_models()?, "No draft models"),
        ModelCommand::Current => match app.client()?.current_model()? {
            Some(model) => {
                for (label, value) in model.summary() {
                    println!("{label}: {value}");
                }
            }
            None => println!("No model loaded"),
        },
        ModelCommand::Load {
            model,
            preset,
            params,
        } => {
            let mut session = app.blank_session();
            if let Some(name) = preset {
                session.apply_preset(&app.presets.get(&name)?);
            }
            params.apply(&mut session.fields)?;
            session.select_model(&model);

            let client = app.client()?;
            session
                .load_model(&client)
                .with_context(|| format!("Failed to load model '{model}'"))?;
            println!("Loaded model '{model}'");
        }
        ModelCommand::Unload => {
            app.client()?.unload_model()?;
            println!("Model unloaded");
        }
    }
    Ok(())
}

fn run_loras(app: &App, action: LoraCommand) -> Result<()> {
    match action {
        LoraCommand::List => print_list(&app.client()?.loras()?, "No LoRAs"),
        LoraCommand::Current => {
            let loras = app.client()?.current_loras()?;
            if loras.is_empty() {
                println!("No LoRAs loaded");
            }
            for lora in loras {
                println!("{} (scaling {:.2})", lora.id, lora.scaling);
            }
        }
        LoraCommand::Load { names, scalings } => {
            let scalings = if scalings.is_empty() {
                vec![defaults::LORA_SCALING; names.len()]
            } else {
                scalings
            };
            app.client()?.load_loras(&names, &scalings)?;
            println!("Loaded {} LoRA(s)", names.len());
        }
        LoraCommand::Unload => {
            app.client()?.unload_loras()?;
            println!("LoRAs unloaded");
        }
    }
    Ok(())
}

fn run_overrides(app: &App, action: OverrideCommand) -> Result<()> {
    match action {
        OverrideCommand::List => print_list(&app.client()?.sampler_overrides()?, "No overrides"),
        OverrideCommand::Switch { name } => {
            app.client()?.switch_sampler_override(&name)?;
            println!("Switched to sampler override '{name}'");
        }
        OverrideCommand::Unload => {
            app.client()?.unload_sampler_override()?;
            println!("Sampler override unloaded");
        }
    }
    Ok(())
}

fn run_download(app: &App, args: DownloadArgs) -> Result<()> {
    let client = app.client()?;
    if args.cancel {
        client.cancel_download()?;
        println!("Download cancelled");
        return Ok(());
    }

    let Some(repo_id) = args.repo_id else {
        bail!("A repository id is required");
    };
    let request = DownloadRequest {
        repo_id,
        revision: args.revision,
        repo_type: args.repo_type.into(),
        folder_name: args.folder_name,
        token: args.token,
        include: split_patterns(&args.include),
        exclude: split_patterns(&args.exclude),
    };
    let path = client.download(&request)?;
    println!("Downloaded {} to {path}", request.repo_id);
    Ok(())
}

fn run_connect(app: &mut App, url: Option<String>) -> Result<()> {
    let url = url.unwrap_or_else(|| app.server_url());
    let shared = SharedEndpoint::default();
    let (tx, rx) = mpsc::channel();

    let handle = spawn_connect(shared, &url, &app.admin_key, tx);
    let outcome = rx.recv().context("Connect worker exited without reporting")?;
    if handle.join().is_err() {
        warn!("Connect worker panicked");
    }

    match outcome {
        ConnectOutcome::Connected { url, snapshot } => {
            app.settings
                .set_last_connected_server(&url)
                .context("Failed to record last connected server")?;
            println!("Connected to {url}");
            println!("{} model(s), {} LoRA(s) available", snapshot.models.len(), snapshot.loras.len());
            match snapshot.current_model {
                Some(model) => println!("Current model: {}", model.id),
                None => println!("No model loaded"),
            }
            Ok(())
        }
        ConnectOutcome::Failed { url, error } => {
            Err(error).with_context(|| format!("Failed to connect to {url}"))
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init()?;

    let mut app = App::open(&cli)?;
    match cli.command {
        Command::Presets { action } => run_presets(&app, action),
        Command::Settings { action } => run_settings(&mut app, action),
        Command::Templates { action } => run_templates(&app, action),
        Command::Models { action } => run_models(&app, action),
        Command::Loras { action } => run_loras(&app, action),
        Command::Overrides { action } => run_overrides(&app, action),
        Command::Download(args) => run_download(&app, args),
        Command::Connect { url } => run_connect(&mut app, url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_model_load() {
        let cli = Cli::try_parse_from([
            "tabload",
            "--api-url",
            "http://gpu-box:5000",
            "models",
            "load",
            "Llama-3-8B",
            "--preset",
            "Fast",
            "--set",
            "max_seq_len=8192",
            "--fasttensors",
        ])
        .unwrap();

        assert_eq!(cli.api_url.as_deref(), Some("http://gpu-box:5000"));
        match cli.command {
            Command::Models {
                action: ModelCommand::Load { model, preset, params },
            } => {
                assert_eq!(model, "Llama-3-8B");
                assert_eq!(preset.as_deref(), Some("Fast"));
                assert_eq!(params.sets, vec!["max_seq_len=8192"]);
                assert!(params.fasttensors);
                assert!(!params.enable_auto_split);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_preset_label_marks_only_untouched_builtins() {
        assert_eq!(preset_label("Default Preset", &[]), "Default Preset (built-in)");
        assert_eq!(
            preset_label("Default Preset", &["Default Preset".to_string()]),
            "Default Preset"
        );
        assert_eq!(preset_label("Fast", &["Fast".to_string()]), "Fast");
    }

    #[test]
    fn test_download_requires_repo_unless_cancel() {
        assert!(Cli::try_parse_from(["tabload", "download"]).is_err());
        assert!(Cli::try_parse_from(["tabload", "download", "--cancel"]).is_ok());
    }

    #[test]
    fn test_server_url_prefers_flag_then_auto_connect() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "tabload",
            "--config-dir",
            dir.path().to_str().unwrap(),
            "settings",
            "show",
        ])
        .unwrap();
        let mut app = App::open(&cli).unwrap();
        assert_eq!(app.server_url(), defaults::API_URL);

        app.settings.set_last_connected_server("http://last:5000").unwrap();
        assert_eq!(app.server_url(), defaults::API_URL);
        app.settings.set_auto_connect(true).unwrap();
        // Enabling auto-connect records the configured URL as the last server
        assert_eq!(app.server_url(), defaults::API_URL);

        app.api_url = Some("http://flag:5000".into());
        assert_eq!(app.server_url(), "http://flag:5000");
    }
}
