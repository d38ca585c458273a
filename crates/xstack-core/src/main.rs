use chrono::NaiveDate;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use xstack_core::{
    init_tracing, EntryPoint, GateConfig, GateDriver, GateError, GateRequest, LogFormat, EXIT_REFUSAL,
};
use xstack_kernel::Profile;
use xstack_workspace::process_env;

const REPO_ROOT_ENV: &str = "DOM_REPO_ROOT";

fn with_gate_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("repo-root")
            .long("repo-root")
            .value_parser(value_parser!(PathBuf))
            .help("Repository root (default: $DOM_REPO_ROOT, then the current directory)"),
    )
    .arg(
        Arg::new("workspace-id")
            .long("workspace-id")
            .help("Workspace discriminator (default: $DOM_WS_ID)"),
    )
    .arg(
        Arg::new("only-gate")
            .long("only-gate")
            .action(ArgAction::Append)
            .help("Run only this group and its dependencies; repeatable"),
    )
    .arg(
        Arg::new("snapshot")
            .long("snapshot")
            .action(ArgAction::SetTrue)
            .help("Also write the identity manifest and findings snapshot"),
    )
}

fn cli() -> Command {
    let gate = EntryPoint::ALL.into_iter().fold(
        Command::new("gate")
            .about("Run a named gate entry point")
            .subcommand_required(true),
        |cmd, entry| {
            let about = match entry {
                EntryPoint::Precheck => "FAST profile, incremental and cached",
                EntryPoint::Verify => "STRICT profile, cold",
                EntryPoint::Exitcheck => "DEEP profile with analyzers and snapshots",
            };
            cmd.subcommand(with_gate_args(Command::new(entry.as_str()).about(about)))
        },
    );

    let run = Profile::ALL.into_iter().fold(
        Command::new("run")
            .about("Run a bare profile")
            .subcommand_required(true),
        |cmd, profile| {
            let name = match profile {
                Profile::Fast => "fast",
                Profile::Strict => "strict",
                Profile::Deep => "deep",
            };
            cmd.subcommand(
                with_gate_args(Command::new(name)).arg(
                    Arg::new("cache")
                        .long("cache")
                        .value_parser(["on", "off"])
                        .default_value("on")
                        .help("Use the group cache"),
                ),
            )
        },
    );

    Command::new("xstack")
        .version(xstack_core::VERSION)
        .about("Repository governance gates")
        .subcommand_required(true)
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(value_parser!(LogFormat))
                .help("Log line format on stderr: text or json"),
        )
        .arg(
            Arg::new("today")
                .long("today")
                .global(true)
                .value_parser(value_parser!(NaiveDate))
                .help("Date for override expiry, YYYY-MM-DD (default: UTC today)"),
        )
        .subcommand(gate)
        .subcommand(run)
}

fn refuse(error: &GateError) -> i32 {
    let refusal = error.refusal();
    eprintln!("{}", refusal.code);
    eprintln!("{refusal}");
    refusal.exit_code()
}

/// Deepest subcommand matches; global flags are visible there wherever they were given
fn leaf(matches: &ArgMatches) -> &ArgMatches {
    let mut current = matches;
    while let Some((_, sub)) = current.subcommand() {
        current = sub;
    }
    current
}

fn build_request(matches: &ArgMatches) -> anyhow::Result<GateRequest> {
    let (request_for, args) = match matches.subcommand() {
        Some(("gate", gate)) => {
            let (name, args) = gate
                .subcommand()
                .ok_or_else(|| anyhow::anyhow!("missing gate entry point"))?;
            let entry = EntryPoint::parse(name).ok_or_else(|| anyhow::anyhow!("unknown entry point {name}"))?;
            (Target::Entry(entry), args)
        }
        Some(("run", run)) => {
            let (name, args) = run
                .subcommand()
                .ok_or_else(|| anyhow::anyhow!("missing profile"))?;
            let profile: Profile = name.parse().map_err(anyhow::Error::msg)?;
            (Target::Profile(profile), args)
        }
        _ => anyhow::bail!("expected `gate` or `run`"),
    };

    let env = process_env();
    let repo_root = match args.get_one::<PathBuf>("repo-root") {
        Some(root) => root.clone(),
        None => match env.get(REPO_ROOT_ENV).filter(|v| !v.is_empty()) {
            Some(root) => PathBuf::from(root),
            None => std::env::current_dir()?,
        },
    };

    let mut request = match request_for {
        Target::Entry(entry) => GateRequest::new(repo_root, entry),
        Target::Profile(profile) => GateRequest::for_profile(repo_root, profile),
    };
    if let Some(id) = args.get_one::<String>("workspace-id") {
        request = request.with_workspace_id(id.clone());
    }
    let only_gate: Vec<String> = args
        .get_many::<String>("only-gate")
        .map(|gates| gates.cloned().collect())
        .unwrap_or_default();
    request = request
        .with_only_gate(only_gate)
        .with_snapshot(args.get_flag("snapshot"))
        .with_host_env(env);
    if let Some(cache) = args.try_get_one::<String>("cache").ok().flatten() {
        request = request.with_cache(cache == "on");
    }
    if let Some(today) = args.get_one::<NaiveDate>("today") {
        request = request.with_today(*today);
    }
    Ok(request)
}

enum Target {
    Entry(EntryPoint),
    Profile(Profile),
}

async fn execute(matches: &ArgMatches) -> anyhow::Result<i32> {
    let request = build_request(matches)?;

    let config = match GateConfig::load(&request.repo_root, &request.host_env) {
        Ok(config) => config,
        Err(e) => return Ok(refuse(&e)),
    };
    let driver = match GateDriver::new(config) {
        Ok(driver) => driver,
        Err(e) => return Ok(refuse(&e)),
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    let report = driver.run(&request, &cancel).await;

    println!("{}", report.summary());
    for token in &report.refusal_tokens {
        eprintln!("{token}");
    }
    for blocker in &report.blockers {
        eprint!("{}", blocker.render());
    }
    if let Some(path) = &report.runlog_path {
        eprintln!("runlog: {}", path.display());
    }
    Ok(report.returncode())
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    let format = leaf(&matches)
        .get_one::<LogFormat>("log-format")
        .copied()
        .unwrap_or_default();
    init_tracing(format);

    let code = match execute(&matches).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("REFUSE_INVALID_INPUT");
            eprintln!("{e:#}");
            EXIT_REFUSAL
        }
    };
    std::process::exit(code);
}
