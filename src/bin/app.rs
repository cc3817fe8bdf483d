use std::{path::PathBuf, rc::Rc};

use clap::Parser;
use file_workspace::{
    capability::NativePicker,
    settings::AppSettings,
    sync::{HttpRemoteSync, RemoteSync},
    workspace::{UploadOutcome, Workspace},
};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file to use instead of the one in the config directory
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Overrides the autosave delay, in milliseconds
    #[arg(short, long)]
    debounce_ms: Option<u64>,
    /// Push every saved file to the remote API as well
    #[arg(long)]
    remote_sync: bool,
    /// Write the resulting settings to the config directory and exit
    #[arg(long)]
    save_settings: bool,
}

#[derive(Clone, Copy)]
enum View {
    Landing,
    Workspace,
}

const LANDING_HELP: &str = "Commands: open, quit";
const WORKSPACE_HELP: &str = "Commands: file, folder, select <name>, edit <text>, append <text>, show, list, clear, back, quit";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::new()
        .filter(Some("file_workspace"), log::LevelFilter::Info)
        .parse_default_env()
        .init();
    let cli = Cli::parse();

    let mut settings = AppSettings::load(cli.config.as_deref())?;
    if let Some(debounce_ms) = cli.debounce_ms {
        settings.autosave_debounce_ms = debounce_ms;
    }
    settings.remote_sync |= cli.remote_sync;
    if cli.save_settings {
        let path = settings.save_to_disk()?;
        println!("Settings written to {}", path.display());
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run(settings))
}

async fn run(settings: AppSettings) -> anyhow::Result<()> {
    let remote = if settings.remote_sync {
        info!("Remote sync enabled at {}", settings.api_url());
        let remote: Rc<dyn RemoteSync> = Rc::new(HttpRemoteSync::new(settings.api_url()));
        Some(remote)
    } else {
        None
    };
    let picker = NativePicker::new().with_start_dir(std::env::current_dir()?);
    let workspace = Workspace::with_remote(Rc::new(picker), &settings, remote);

    let mut view = View::Landing;
    println!("Text file workspace. {}", LANDING_HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        let (command, argument) = line.split_once(' ').unwrap_or((line, ""));

        match (view, command) {
            (_, "") => {}
            (_, "quit") => break,
            (View::Landing, "open") => {
                view = View::Workspace;
                print!("{}", workspace.sidebar());
                println!("{}", WORKSPACE_HELP);
            }
            (View::Landing, _) => println!("{}", LANDING_HELP),
            (View::Workspace, "back") => {
                view = View::Landing;
                println!("{}", LANDING_HELP);
            }
            (View::Workspace, "file") => {
                report(workspace.upload_file().await);
                print!("{}", workspace.sidebar());
            }
            (View::Workspace, "folder") => {
                report(workspace.upload_folder().await);
                print!("{}", workspace.sidebar());
            }
            (View::Workspace, "select") => {
                if workspace.select_existing_file(argument).await {
                    println!("{}", workspace.registry().editor_text());
                } else {
                    println!("Unknown file: {}", argument);
                }
            }
            (View::Workspace, "edit") => workspace.on_editor_text_changed(argument),
            (View::Workspace, "append") => {
                let mut text = workspace.registry().editor_text().to_string();
                text.push_str(argument);
                text.push('\n');
                workspace.on_editor_text_changed(text);
            }
            (View::Workspace, "show") => {
                let registry = workspace.registry();
                match registry.selected_file() {
                    Some(name) => println!("--- {} ---\n{}", name, registry.editor_text()),
                    None => println!("Select a file from the sidebar to start editing"),
                }
            }
            (View::Workspace, "list") => print!("{}", workspace.sidebar()),
            (View::Workspace, "clear") => {
                workspace.clear();
                print!("{}", workspace.sidebar());
            }
            (View::Workspace, _) => println!("{}", WORKSPACE_HELP),
        }
    }

    workspace.flush().await;
    info!("Bye");
    Ok(())
}

fn report(outcome: UploadOutcome) {
    match outcome {
        UploadOutcome::Opened(name) => println!("Opened {}", name),
        UploadOutcome::Reopened(name) => println!("Reloaded {} from disk", name),
        UploadOutcome::Imported { folder, files } => {
            println!("Imported {} files from {}", files.len(), folder)
        }
        UploadOutcome::Cancelled => {}
        UploadOutcome::Failed(message) => warn!("Upload failed: {}", message),
    }
}
