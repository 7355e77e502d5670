use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::lib::{
    api::types::ApiServer,
    backend::{
        sample::SampleBackend,
        types::{Backend, ContainerForm, LogOptions, Platform, RestartPolicy},
    },
    config::{ArcboxPaths, Settings},
    daemon::{
        manager::{DaemonManager, find_daemon_binary, ping_daemon},
        types::DaemonConfig,
    },
    lists::{
        containers::ContainerList, images::ImageList, logs::LogBuffer, machines::MachineList,
        networks::NetworkList, volumes::VolumeList,
    },
    resources::{format::total_size, types::ContainerViewModel},
    service::service::DaemonService,
};

mod lib {
    pub mod api;
    pub mod backend;
    pub mod config;
    pub mod daemon;
    pub mod error;
    pub mod lists;
    pub mod resources;
    pub mod service;
}

#[derive(Parser)]
#[command(name = "arcbox-desktop")]
#[command(about = "Manage containers, images, volumes, networks and machines of an arcbox daemon")]
#[command(version)]
struct Cli {
    /// Use the built-in sample data instead of a daemon
    #[arg(long, global = true)]
    sample: bool,

    /// Docker API socket of the daemon
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Data directory (default: ~/.arcbox)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List containers grouped by compose project
    Ps {
        #[arg(short, long)]
        all: bool,
    },
    Images,
    Volumes,
    Networks,
    Machines,
    Start {
        id: String,
    },
    Stop {
        id: String,
        /// Seconds to wait before killing the container
        #[arg(short, long, default_value_t = 10)]
        time: u32,
    },
    Restart {
        id: String,
    },
    Rm {
        id: String,
        #[arg(short, long)]
        force: bool,
    },
    Logs {
        id: String,
        #[arg(short, long)]
        follow: bool,
        /// Line count, or `all`
        #[arg(long, default_value = "100", value_parser = parse_tail)]
        tail: Tail,
        #[arg(short, long)]
        timestamps: bool,
    },
    Create(CreateArgs),
    /// Serve the backend over HTTP
    Serve {
        #[arg(long)]
        addr: Option<String>,
    },
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

/// `--tail` value; `None` means every line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tail(Option<u32>);

fn parse_tail(value: &str) -> Result<Tail, String> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(Tail(None));
    }
    value
        .parse()
        .map(|n| Tail(Some(n)))
        .map_err(|_| format!("expected a line count or \"all\", got {}", value))
}

#[derive(Args)]
struct CreateArgs {
    image: String,
    #[arg(long)]
    name: Option<String>,
    /// Start the container once created
    #[arg(long)]
    start: bool,
    #[arg(long)]
    command: Option<String>,
    #[arg(long)]
    entrypoint: Option<String>,
    #[arg(short, long)]
    workdir: Option<String>,
    #[arg(long, default_value_t = Platform::Auto)]
    platform: Platform,
    #[arg(long, default_value_t = RestartPolicy::No)]
    restart: RestartPolicy,
    #[arg(long)]
    rm: bool,
    #[arg(long)]
    privileged: bool,
    #[arg(long)]
    read_only: bool,
    #[arg(long)]
    init: bool,
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Start (or attach to) the daemon and keep it running until Ctrl-C
    Start,
    Status,
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    /// Write the current settings to disk
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,arcbox_desktop=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = cli
        .data_dir
        .clone()
        .map(ArcboxPaths::with_data_dir)
        .unwrap_or_default();
    let mut settings = Settings::load(&paths.settings_file())?;
    if let Some(socket) = &cli.socket {
        settings.daemon.socket = Some(socket.clone());
    }
    debug!("Using data dir {}", paths.data_dir.display());

    match cli.command {
        Command::Daemon { action } => run_daemon(action, &settings, &paths).await,
        Command::Settings { action } => run_settings(action, &settings, &paths),
        command => {
            let service = connect(cli.sample, &settings, &paths).await?;
            run_command(command, &service, &settings).await
        }
    }
}

async fn connect(sample: bool, settings: &Settings, paths: &ArcboxPaths) -> anyhow::Result<DaemonService> {
    if sample {
        info!("Using sample data");
        return Ok(DaemonService::with_backend(Arc::new(SampleBackend::new())));
    }
    let socket = settings.docker_socket(paths);
    let service = DaemonService::new(socket.clone());
    service
        .connect()
        .await
        .with_context(|| format!("cannot reach daemon at {}", socket.display()))?;
    Ok(service)
}

async fn run_command(
    command: Command,
    service: &DaemonService,
    settings: &Settings,
) -> anyhow::Result<()> {
    match command {
        Command::Ps { all } => {
            let mut containers = ContainerList::new();
            containers.load(service.list_containers(all).await?);
            print_containers(&containers);
        }
        Command::Images => {
            let mut images = ImageList::new();
            images.load(service.list_images().await?);
            println!("{:<40} {:<14} {:>10} {:<16} {}", "IMAGE", "ID", "SIZE", "CREATED", "IN USE");
            for image in images.list.visible() {
                println!(
                    "{:<40} {:<14} {:>10} {:<16} {}",
                    image.full_name(),
                    image.short_id(),
                    image.size_display(),
                    image.created_ago(),
                    if image.in_use { "yes" } else { "no" }
                );
            }
            let stats = images.stats();
            println!(
                "\n{} images, {} total, {} unused ({})",
                stats.total_count,
                total_size(stats.total_size),
                stats.unused_count,
                total_size(stats.unused_size)
            );
        }
        Command::Volumes => {
            let mut volumes = VolumeList::new();
            volumes.load(service.list_volumes().await?);
            println!("{:<28} {:<8} {:>10} {:<16} {}", "VOLUME", "DRIVER", "SIZE", "CREATED", "USAGE");
            for volume in volumes.visible() {
                println!(
                    "{:<28} {:<8} {:>10} {:<16} {}",
                    volume.name,
                    volume.driver,
                    volume.size_display(),
                    volume.created_ago(),
                    volume.usage_display()
                );
            }
            println!("\n{} volumes, {}", volumes.len(), total_size(volumes.total_size()));
        }
        Command::Networks => {
            let mut networks = NetworkList::new();
            networks.load(service.list_networks().await?);
            println!("{:<14} {:<24} {:<18} {}", "ID", "NAME", "DRIVER", "CONTAINERS");
            for network in networks.visible() {
                println!(
                    "{:<14} {:<24} {:<18} {}",
                    network.short_id(),
                    network.name,
                    network.driver_display(),
                    network.usage_display()
                );
            }
        }
        Command::Machines => {
            let mut machines = MachineList::new();
            machines.load(service.list_machines().await?);
            println!("{:<16} {:<22} {:<10} {:<26} {}", "NAME", "DISTRO", "STATE", "RESOURCES", "IP");
            for machine in machines.visible() {
                println!(
                    "{:<16} {:<22} {:<10} {:<26} {}",
                    machine.name,
                    machine.distro.display_name,
                    machine.state.label(),
                    machine.resources_display(),
                    machine.ip_address.as_deref().unwrap_or("-")
                );
            }
            println!("\n{} of {} running", machines.running_count(), machines.len());
        }
        Command::Start { id } => {
            service.start_container(&id).await?;
            println!("{}", id);
        }
        Command::Stop { id, time } => {
            service.stop_container(&id, time).await?;
            println!("{}", id);
        }
        Command::Restart { id } => {
            service.restart_container(&id).await?;
            println!("{}", id);
        }
        Command::Rm { id, force } => {
            service.remove_container(&id, force).await?;
            println!("{}", id);
        }
        Command::Logs {
            id,
            follow,
            tail,
            timestamps,
        } => {
            let backend = service.connected_backend().await?;
            print_logs(backend, &id, follow, tail.0, timestamps).await?;
        }
        Command::Create(args) => {
            let form = ContainerForm {
                image: args.image,
                name: args.name.unwrap_or_default(),
                command: args.command.unwrap_or_default(),
                entrypoint: args.entrypoint.unwrap_or_default(),
                working_dir: args.workdir.unwrap_or_default(),
                platform: args.platform,
                restart_policy: args.restart,
                remove_after_stop: args.rm,
                privileged: args.privileged,
                read_only: args.read_only,
                use_init: args.init,
            };
            let id = service.create_container(form.into_spec(args.start)?).await?;
            println!("{}", id);
        }
        Command::Serve { addr } => {
            let backend = service.connected_backend().await?;
            let addr = addr.unwrap_or_else(|| settings.api.listen.clone());
            ApiServer::new(backend, &addr).start_server().await?;
        }
        Command::Daemon { .. } | Command::Settings { .. } => {}
    }
    Ok(())
}

fn print_container_row(container: &ContainerViewModel, indent: &str) {
    println!(
        "{}{:<24} {:<28} {:<11} {:<20} {}",
        indent,
        container.name,
        container.image,
        container.state.label(),
        container.ports_display(),
        container.created_ago()
    );
}

fn print_containers(containers: &ContainerList) {
    println!(
        "{:<24} {:<28} {:<11} {:<20} {}",
        "NAME", "IMAGE", "STATE", "PORTS", "CREATED"
    );
    let groups = containers.groups();
    for (project, members) in &groups.projects {
        let running = members.iter().filter(|c| c.is_running()).count();
        println!("{} ({}/{} running)", project, running, members.len());
        if containers.is_expanded(project) {
            for container in members {
                print_container_row(container, "  ");
            }
        }
    }
    for container in &groups.standalone {
        print_container_row(container, "");
    }
    println!(
        "\n{} running, {} total",
        containers.running_count(),
        containers.list.len()
    );
}

async fn print_logs(
    backend: Arc<dyn Backend>,
    id: &str,
    follow: bool,
    tail: Option<u32>,
    timestamps: bool,
) -> anyhow::Result<()> {
    let options = LogOptions {
        follow,
        tail,
        timestamps,
    };
    let mut buffer = LogBuffer::default();
    buffer.follow = follow;
    buffer.show_timestamps = timestamps;

    let mut stream = backend.container_logs(id, options).await?;
    loop {
        tokio::select! {
            line = stream.next() => match line {
                Some(line) => {
                    let line = line?;
                    println!("{}", buffer.render_line(&line));
                    buffer.push(line);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    debug!("Printed {} log lines", buffer.len());
    Ok(())
}

async fn run_daemon(
    action: DaemonAction,
    settings: &Settings,
    paths: &ArcboxPaths,
) -> anyhow::Result<()> {
    let config = DaemonConfig::from_settings(settings, paths);
    match action {
        DaemonAction::Status => {
            let binary = find_daemon_binary(config.binary.as_deref());
            let healthy = ping_daemon(&config.socket).await;
            println!("socket:  {}", config.socket.display());
            println!(
                "binary:  {}",
                binary
                    .map(|b| b.display().to_string())
                    .unwrap_or_else(|| "not found".to_string())
            );
            println!("status:  {}", if healthy { "running" } else { "not running" });
        }
        DaemonAction::Start => {
            let manager = DaemonManager::new(config);
            manager.start().await?;
            println!("daemon {}", manager.state().await.label());
            if manager.owns_process().await {
                tokio::signal::ctrl_c().await?;
                manager.stop().await?;
            }
        }
    }
    Ok(())
}

fn run_settings(
    action: SettingsAction,
    settings: &Settings,
    paths: &ArcboxPaths,
) -> anyhow::Result<()> {
    let path = paths.settings_file();
    match action {
        SettingsAction::Show => {
            println!("# {}", path.display());
            println!("{}", serde_json::to_string_pretty(settings)?);
        }
        SettingsAction::Init => {
            settings.save(&path)?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn create_flags_parse_labels() {
        let cli = Cli::try_parse_from([
            "arcbox-desktop",
            "--sample",
            "create",
            "nginx",
            "--platform",
            "linux/arm64",
            "--restart",
            "unless-stopped",
            "--start",
        ])
        .unwrap();
        assert!(cli.sample);
        match cli.command {
            Command::Create(args) => {
                assert_eq!(args.platform, Platform::LinuxArm64);
                assert_eq!(args.restart, RestartPolicy::UnlessStopped);
                assert!(args.start);
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn logs_tail_accepts_all() {
        let tail_of = |args: &[&str]| {
            let cli = Cli::try_parse_from(["arcbox-desktop", "logs", "web"].iter().chain(args))
                .unwrap();
            match cli.command {
                Command::Logs { tail, .. } => tail,
                _ => panic!("expected logs"),
            }
        };
        assert_eq!(tail_of(&[]), Tail(Some(100)));
        assert_eq!(tail_of(&["--tail", "all"]), Tail(None));
        assert_eq!(tail_of(&["--tail", "5"]), Tail(Some(5)));
        assert!(Cli::try_parse_from(["arcbox-desktop", "logs", "web", "--tail", "-3"]).is_err());
    }

    #[tokio::test]
    async fn sample_commands_run() {
        let settings = Settings::default();
        let paths = ArcboxPaths::with_data_dir("/nonexistent");
        let service = connect(true, &settings, &paths).await.unwrap();

        run_command(Command::Ps { all: true }, &service, &settings)
            .await
            .unwrap();
        run_command(
            Command::Stop {
                id: "nginx".to_string(),
                time: 1,
            },
            &service,
            &settings,
        )
        .await
        .unwrap();
        let running = service.list_containers(false).await.unwrap();
        assert_eq!(running.len(), 3);

        assert!(
            run_command(
                Command::Start {
                    id: "missing".to_string()
                },
                &service,
                &settings,
            )
            .await
            .is_err()
        );
    }
}
