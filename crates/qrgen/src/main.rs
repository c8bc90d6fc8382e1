mod error;
mod interactive;
mod logging;
mod progress;
mod prompt;
mod render;
mod session;
mod settings;
mod updater;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::{error, info};
use qrgen_core::{ApplyResult, UpdateDecision, UpdateOutcome, sweep_stale_update_files};
use qrgen_platform::AppPaths;

use crate::error::AppError;
use crate::interactive::SessionEnd;
use crate::render::{EcLevel, OutputFormat, QrSettings};
use crate::session::{Message, SaveOutcome, Session};
use crate::settings::AppSettings;
use crate::updater::{APP_VERSION, Interrupts, UpdateSources, build_config};

#[derive(Debug, Parser)]
#[command(name = "qrgen", version, about = "Generate QR codes from text and links")]
struct Cli {
    /// Log at debug level.
    #[arg(long, global = true)]
    debug: bool,

    /// Plain-text endpoint holding the latest version number.
    #[arg(long, global = true, env = "QRGEN_UPDATE_URL")]
    update_url: Option<String>,

    /// Update artifact: an installer executable or a `.zip` of the app.
    #[arg(long, global = true, env = "QRGEN_ARTIFACT_URL")]
    artifact_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render one QR code to a file.
    Generate(GenerateArgs),
    /// Edit a QR code line by line with a live terminal preview (default).
    Interactive,
    /// Report whether a newer version is published.
    CheckUpdate,
    /// Download and install the latest version.
    Update {
        /// Install without asking for confirmation.
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Text or link to encode. Links without a scheme get `http://`.
    text: String,

    #[arg(long, value_enum, ignore_case = true)]
    ec: Option<EcLevel>,

    #[arg(long, value_parser = clap::value_parser!(u32).range(5..=50))]
    box_size: Option<u32>,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=10))]
    border: Option<u32>,

    #[arg(long, value_enum, ignore_case = true)]
    format: Option<OutputFormat>,

    #[arg(short, long)]
    output: PathBuf,
}

impl GenerateArgs {
    fn settings(&self, defaults: QrSettings) -> QrSettings {
        QrSettings {
            ec_level: self.ec.unwrap_or(defaults.ec_level),
            box_size: self.box_size.unwrap_or(defaults.box_size),
            border: self.border.unwrap_or(defaults.border),
            format: self.format.unwrap_or(defaults.format),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let paths = match AppPaths::new() {
        Ok(paths) => paths,
        Err(err) => {
            eprintln!("{}", AppError::environment_unavailable(err));
            return ExitCode::FAILURE;
        }
    };
    let log_path = logging::init_logging(&paths, cli.debug);
    let settings = AppSettings::load(&paths);
    logging::set_debug_logging(cli.debug || settings.debug_logging);
    logging::trim_log(&log_path, settings.max_log_size_bytes);

    let install_root = qrgen_platform::install_root().ok();
    sweep_stale_update_files(
        &paths.update_lock_file(),
        &paths.update_staging_dir(),
        install_root.as_deref(),
    );

    match run(cli, &paths, settings).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, paths: &AppPaths, mut settings: AppSettings) -> Result<ExitCode, AppError> {
    let sources = UpdateSources {
        update_url: cli.update_url,
        artifact_url: cli.artifact_url,
    };

    match cli.command.unwrap_or(Command::Interactive) {
        Command::Generate(args) => generate(&args, settings.qr),
        Command::Interactive => {
            let config = build_config(paths, &settings, &sources)?;
            let interrupts = Interrupts::install();
            match interactive::run(Session::new(settings.qr), &config, &interrupts).await? {
                SessionEnd::Quit(qr) => {
                    if qr != settings.qr {
                        settings.qr = qr;
                        settings
                            .save(paths)
                            .map_err(AppError::settings_save_failed)?;
                    }
                    Ok(ExitCode::SUCCESS)
                }
                SessionEnd::Updated(result) => Ok(exit_after_update(result)),
            }
        }
        Command::CheckUpdate => {
            let config = build_config(paths, &settings, &sources)?;
            match updater::check_only(config).await? {
                UpdateDecision::UpToDate => {
                    println!("You already have the latest version (v{APP_VERSION}).");
                    Ok(ExitCode::SUCCESS)
                }
                UpdateDecision::UpdateAvailable(latest) => {
                    println!(
                        "A new version ({latest}) is available. Run `qrgen update` to install it."
                    );
                    Ok(ExitCode::SUCCESS)
                }
                UpdateDecision::CheckFailed(err) => {
                    info!("Update check failed: {err}");
                    Err(AppError::UpdateCheckFailed {
                        message: "Cannot contact update server.".to_string(),
                    })
                }
            }
        }
        Command::Update { yes } => {
            let config = build_config(paths, &settings, &sources)?;
            match updater::run_update(config, yes, &Interrupts::install()).await? {
                UpdateOutcome::Applied(result) => Ok(exit_after_update(result)),
                UpdateOutcome::Failed(err) => {
                    // The prompt has already shown this to the user.
                    info!("Update attempt failed: {}", AppError::from(err));
                    Ok(ExitCode::FAILURE)
                }
                _ => Ok(ExitCode::SUCCESS),
            }
        }
    }
}

fn generate(args: &GenerateArgs, defaults: QrSettings) -> Result<ExitCode, AppError> {
    let mut session = Session::new(args.settings(defaults));
    session
        .update(Message::TextChanged(args.text.clone()))
        .map_err(AppError::render_failed)?;

    match session.save(&args.output)? {
        SaveOutcome::Saved(path) => {
            info!("Saved QR code to {}", path.display());
            println!("Saved {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        SaveOutcome::NothingToSave => {
            println!("Nothing to save: the text is empty.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn exit_after_update(result: ApplyResult) -> ExitCode {
    match result {
        ApplyResult::RestartRequired => info!("Exiting so the updated version can be started"),
        ApplyResult::ExitForInstaller => info!("Exiting so the installer can replace qrgen"),
    }
    ExitCode::SUCCESS
}
