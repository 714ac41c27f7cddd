use anyhow::{anyhow, bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use sharex_files::unpack;
use sharex_p2p::{
    AnnounceConfig, AnnouncementAgent, Libp2pConfig, Libp2pEvent, Libp2pNetwork,
};
use sharex_storage::{ContentStore, KuboConnector, MemoryConnector, SledConnector};
use sharex_transfer::{gateway_link, TransferService, UploadInput};
use sharex_types::{ContentId, LocalFile, ShareKey, PATH_SEPARATOR};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app_config;
mod version;

use app_config::{parse_multiaddrs, AppConfig};
use version::{git_commit_hash, SHAREX_VERSION};

fn cli() -> Command {
    Command::new("sharex-node")
        .version(SHAREX_VERSION)
        .about("Content-addressed file sharing node")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file path")
                .global(true),
        )
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Data directory")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "plain"])
                .help("Log output format")
                .global(true),
        )
        .subcommand(
            Command::new("start").about("Run the p2p node and the relay announcement agent"),
        )
        .subcommand(
            Command::new("upload")
                .about("Upload a file or a folder (folders are archived first)")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("secret")
                        .long("secret")
                        .value_name("SECRET")
                        .help("Share secret recorded on the descriptor"),
                ),
        )
        .subcommand(
            Command::new("download")
                .about("Download content by CID")
                .arg(Arg::new("cid").required(true))
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Output file, or directory with --extract"),
                )
                .arg(
                    Arg::new("extract")
                        .long("extract")
                        .action(ArgAction::SetTrue)
                        .help("Unpack a folder archive into the output directory"),
                ),
        )
        .subcommand(
            Command::new("metadata")
                .about("Show stored metadata for a CID")
                .arg(Arg::new("cid").required(true)),
        )
        .subcommand(
            Command::new("share-key")
                .about("Derive the share key for a CID, secret and requester address")
                .arg(Arg::new("cid").required(true))
                .arg(Arg::new("secret").long("secret").required(true))
                .arg(Arg::new("address").long("address").required(true)),
        )
}

fn load_config_with_overrides(matches: &clap::ArgMatches) -> Result<AppConfig> {
    let config_path = matches.get_one::<PathBuf>("config");
    let data_dir = matches.get_one::<PathBuf>("data-dir");
    let mut config = AppConfig::load(config_path.map(PathBuf::as_path), data_dir.map(PathBuf::as_path))?;
    apply_overrides(matches, &mut config);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(matches: &clap::ArgMatches, config: &mut AppConfig) {
    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log_level = log_level.clone();
    }
    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log_format = log_format.clone();
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "pretty" {
        registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config = load_config_with_overrides(&matches)?;
    init_logging(&config)?;
    debug!(
        version = SHAREX_VERSION,
        commit = git_commit_hash(),
        config_path = ?config.config_path,
        "configuration loaded"
    );

    match matches.subcommand() {
        Some(("upload", sub)) => run_upload(&config, sub).await,
        Some(("download", sub)) => run_download(&config, sub).await,
        Some(("metadata", sub)) => run_metadata(&config, sub).await,
        Some(("share-key", sub)) => run_share_key(sub),
        Some(("start", _)) | None => run_node(&config).await,
        Some((other, _)) => bail!("unknown command {other}"),
    }
}

fn build_transfer_service(config: &AppConfig) -> TransferService {
    let store = match config.store_backend.as_str() {
        "memory" => {
            warn!("memory store selected; content is lost when the process exits");
            ContentStore::new(MemoryConnector::new(config.chunk_size))
        }
        "kubo" => ContentStore::new(KuboConnector::new(&config.kubo_api_url)),
        _ => ContentStore::new(
            SledConnector::new(config.content_dir()).with_chunk_size(config.chunk_size),
        ),
    };
    TransferService::new(store)
}

fn required<'a>(matches: &'a clap::ArgMatches, name: &str) -> Result<&'a String> {
    matches
        .get_one::<String>(name)
        .ok_or_else(|| anyhow!("missing required argument <{name}>"))
}

fn parse_cid(matches: &clap::ArgMatches) -> Result<ContentId> {
    let raw = required(matches, "cid")?;
    ContentId::parse(raw.as_str()).with_context(|| format!("invalid CID '{raw}'"))
}

async fn run_upload(config: &AppConfig, matches: &clap::ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<PathBuf>("path")
        .ok_or_else(|| anyhow!("missing required argument <path>"))?;
    let secret = matches.get_one::<String>("secret").cloned();
    let input = read_upload_input(path)?;

    let service = build_transfer_service(config);
    let outcome = service.upload_with_secret(input, secret).await;
    println!("{}", serde_json::to_string_pretty(&outcome.descriptor)?);

    if let Some(err) = outcome.error {
        return Err(anyhow::Error::new(err).context(format!("upload of {} failed", path.display())));
    }
    if let Some(link) = gateway_link(&outcome.descriptor, &config.gateway_base) {
        println!("{link}");
    }
    Ok(())
}

async fn run_download(config: &AppConfig, matches: &clap::ArgMatches) -> Result<()> {
    let cid = parse_cid(matches)?;
    let out = matches
        .get_one::<PathBuf>("out")
        .ok_or_else(|| anyhow!("missing required argument --out"))?;

    let service = build_transfer_service(config);
    let data = service.download(&cid).await?;

    if matches.get_flag("extract") {
        let written = extract_archive(&data, out)?;
        info!(%cid, files = written, out = %out.display(), "archive extracted");
    } else {
        fs::write(out, &data).with_context(|| format!("failed to write {}", out.display()))?;
        info!(%cid, size_bytes = data.len(), out = %out.display(), "download complete");
    }
    Ok(())
}

async fn run_metadata(config: &AppConfig, matches: &clap::ArgMatches) -> Result<()> {
    let cid = parse_cid(matches)?;
    match build_transfer_service(config).metadata(&cid).await? {
        Some(descriptor) => println!("{}", serde_json::to_string_pretty(&descriptor)?),
        None => println!("not found"),
    }
    Ok(())
}

fn run_share_key(matches: &clap::ArgMatches) -> Result<()> {
    let cid = parse_cid(matches)?;
    let secret = required(matches, "secret")?;
    let address = required(matches, "address")?;
    println!("{}", ShareKey::derive(&cid, secret, address).to_hex());
    Ok(())
}

async fn run_node(config: &AppConfig) -> Result<()> {
    info!(version = SHAREX_VERSION, "starting sharex node");

    let libp2p_config = Libp2pConfig {
        listen_addresses: parse_multiaddrs(&config.listen_multiaddrs, "listen"),
        bootstrap_peers: parse_multiaddrs(&config.bootstrap_multiaddrs, "bootstrap"),
        relay_servers: parse_multiaddrs(&config.relay_multiaddrs, "relay"),
        enable_mdns: config.enable_mdns,
        enable_relay: config.enable_relay,
        ..Libp2pConfig::default()
    };
    let network = Arc::new(Libp2pNetwork::new(libp2p_config).context("failed to start libp2p")?);
    let mut events = network
        .take_event_receiver()
        .ok_or_else(|| anyhow!("libp2p event receiver already taken"))?;

    let agent = AnnouncementAgent::new(
        network.clone(),
        AnnounceConfig {
            topic: config.announce_topic.clone(),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
        },
    );
    let agent_handle = agent.start().await?;
    info!(peer_id = %network.peer_id(), "node running; press Ctrl-C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!("failed to listen for shutdown signal: {err}");
                }
                break;
            }
            event = events.recv() => match event {
                Some(event) => handle_p2p_event(event),
                None => {
                    warn!("libp2p event stream ended");
                    break;
                }
            },
        }
    }

    info!("shutting down");
    agent_handle.shutdown();
    network.shutdown();
    Ok(())
}

fn handle_p2p_event(event: Libp2pEvent) {
    match event {
        Libp2pEvent::NewListenAddr { address } => info!(%address, "listening"),
        Libp2pEvent::PeerConnected { peer } => debug!(%peer, "peer connected"),
        Libp2pEvent::PeerDisconnected { peer } => debug!(%peer, "peer disconnected"),
        Libp2pEvent::PeerDiscovered { peers } => debug!(count = peers.len(), "peers discovered"),
        Libp2pEvent::RelayReservationAccepted { relay } => info!(%relay, "reachable through relay"),
        Libp2pEvent::HolePunchSucceeded { peer } => debug!(%peer, "hole punch succeeded"),
        Libp2pEvent::HolePunchFailed { peer, error } => debug!(%peer, "hole punch failed: {error}"),
        Libp2pEvent::Gossip { .. } => {}
    }
}

fn read_upload_input(path: &Path) -> Result<UploadInput> {
    let metadata =
        fs::metadata(path).with_context(|| format!("cannot read {}", path.display()))?;
    if metadata.is_dir() {
        return Ok(UploadInput::Folder(collect_folder(path)?));
    }

    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?;
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(UploadInput::File(LocalFile::new(name, guess_mime_type(path), data)))
}

/// Every regular file below `root`, with path hints rooted at the folder
/// name (`docs/sub/b.txt`). Sorted by path.
fn collect_folder(root: &Path) -> Result<Vec<LocalFile>> {
    let root_name = root
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", root.display()))?
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{} has no usable folder name", root.display()))?;

    let mut files = Vec::new();
    let mut pending = vec![(root.to_path_buf(), root_name)];
    while let Some((dir, hint)) = pending.pop() {
        for entry in fs::read_dir(&dir).with_context(|| format!("cannot list {}", dir.display()))? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "skipping non UTF-8 file name");
                continue;
            };
            let child_hint = format!("{hint}{PATH_SEPARATOR}{name}");
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push((entry.path(), child_hint));
            } else if file_type.is_file() {
                let data = fs::read(entry.path())?;
                files.push(LocalFile::new(child_hint, guess_mime_type(&entry.path()), data));
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn guess_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// Write archive entries below `out`. Entries that would escape `out` are
/// rejected.
fn extract_archive(data: &[u8], out: &Path) -> Result<usize> {
    let entries = unpack(data).context("content is not a folder archive")?;
    for (name, contents) in &entries {
        let relative = Path::new(name);
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            bail!("archive entry '{name}' escapes the output directory");
        }
        let target = out.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, contents)
            .with_context(|| format!("failed to write {}", target.display()))?;
    }
    Ok(entries.len())
}
