//! Subcommands of `dmake`
//!
//! The set of subcommands is fixed: each entry of [`SUBCOMMANDS`] pairs the
//! clap declaration with its handler.

use crate::logging;
use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use dmake_codec::{DatasetPath, Parameters, PathError};
use dmake_core::{ComputeConfig, ComputeRequest, Orchestrator, Status, StatusRecord};
use dmake_workspace::{GitAnnexBackend, Provisioner};
use std::io::Write;
use std::path::PathBuf;

/// A subcommand: its declaration and its handler
#[derive(Debug, Clone, Copy)]
pub struct Subcommand {
    pub name: &'static str,
    pub command: fn() -> Command,
    pub run: fn(&ArgMatches) -> Result<()>,
}

/// All subcommands
pub static SUBCOMMANDS: &[Subcommand] = &[
    Subcommand {
        name: "compute",
        command: compute_command,
        run: run_compute,
    },
    Subcommand {
        name: "provision",
        command: provision_command,
        run: run_provision,
    },
];

/// The `dmake` command line
#[must_use]
pub fn cli() -> Command {
    let root = Command::new("dmake")
        .version(crate::VERSION)
        .about("Reproducible, lazily materialized derived files for datasets")
        .subcommand_required(true)
        .arg_required_else_help(true);
    SUBCOMMANDS
        .iter()
        .fold(root, |cli, sub| cli.subcommand((sub.command)()))
}

/// Run the subcommand selected in `matches`
///
/// # Errors
/// Returns the subcommand's error, with context.
pub fn dispatch(matches: &ArgMatches) -> Result<()> {
    let (name, args) = matches.subcommand().context("no subcommand given")?;
    let sub = SUBCOMMANDS
        .iter()
        .find(|sub| sub.name == name)
        .with_context(|| format!("unknown subcommand '{name}'"))?;
    (sub.run)(args)
}

fn dataset_arg() -> Arg {
    Arg::new("dataset")
        .short('d')
        .long("dataset")
        .default_value(".")
        .value_parser(value_parser!(PathBuf))
        .help("Dataset to operate on")
}

fn input_arg() -> Arg {
    Arg::new("input")
        .short('i')
        .long("input")
        .action(ArgAction::Append)
        .value_parser(parse_dataset_path)
        .help("Dataset-relative input path, repeatable")
}

fn branch_arg() -> Arg {
    Arg::new("branch")
        .short('b')
        .long("branch")
        .help("Revision to work from instead of the current one")
}

fn parse_dataset_path(raw: &str) -> Result<DatasetPath, PathError> {
    raw.parse()
}

fn compute_command() -> Command {
    Command::new("compute")
        .about("Run a template and register provenance URLs for its outputs")
        .arg(dataset_arg())
        .arg(
            Arg::new("template")
                .required(true)
                .help("Template name below .datalad/compute/methods"),
        )
        .arg(
            Arg::new("url-only")
                .short('u')
                .long("url-only")
                .action(ArgAction::SetTrue)
                .help("Only register URLs, do not compute"),
        )
        .arg(branch_arg())
        .arg(input_arg())
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .action(ArgAction::Append)
                .value_parser(parse_dataset_path)
                .help("Dataset-relative output path, repeatable"),
        )
        .arg(
            Arg::new("parameter")
                .short('p')
                .long("parameter")
                .action(ArgAction::Append)
                .help("Template parameter as name=value, repeatable"),
        )
        .arg(
            Arg::new("input-list")
                .short('I')
                .long("input-list")
                .value_parser(value_parser!(PathBuf))
                .help("File listing one input path per line"),
        )
        .arg(
            Arg::new("output-list")
                .short('O')
                .long("output-list")
                .value_parser(value_parser!(PathBuf))
                .help("File listing one output path per line"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print status records as JSON lines"),
        )
}

fn provision_command() -> Command {
    Command::new("provision")
        .about("Create a detached workspace of a dataset, or remove one")
        .arg(dataset_arg())
        .arg(branch_arg())
        .arg(input_arg())
        .arg(
            Arg::new("delete")
                .long("delete")
                .value_parser(value_parser!(PathBuf))
                .conflicts_with_all(["branch", "input"])
                .help("Remove a workspace created earlier"),
        )
}

fn dataset_path(args: &ArgMatches) -> Result<PathBuf> {
    let dataset = args
        .get_one::<PathBuf>("dataset")
        .context("--dataset has no value")?;
    dataset
        .canonicalize()
        .with_context(|| format!("dataset {} not found", dataset.display()))
}

fn paths(args: &ArgMatches, name: &str) -> Vec<DatasetPath> {
    args.get_many::<DatasetPath>(name)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

/// Build the request described by `compute` arguments
///
/// # Errors
/// Returns an error if the dataset does not exist or a parameter is invalid.
pub fn compute_request(args: &ArgMatches) -> Result<ComputeRequest> {
    let dataset = dataset_path(args)?;
    let template = args
        .get_one::<String>("template")
        .context("template is required")?;
    let parameters = Parameters::parse_assignments(
        args.get_many::<String>("parameter").into_iter().flatten(),
    )
    .context("invalid --parameter")?;

    let mut request = ComputeRequest::new(dataset, template.as_str())
        .with_parameters(parameters)
        .with_inputs(paths(args, "input"))
        .with_outputs(paths(args, "output"))
        .url_only(args.get_flag("url-only"));
    if let Some(branch) = args.get_one::<String>("branch") {
        request = request.with_branch(branch.as_str());
    }
    if let Some(list) = args.get_one::<PathBuf>("input-list") {
        request = request.with_input_list(list);
    }
    if let Some(list) = args.get_one::<PathBuf>("output-list") {
        request = request.with_output_list(list);
    }
    Ok(request)
}

/// Format one status record for stdout
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn render(record: &StatusRecord, json: bool) -> Result<String> {
    if json {
        return serde_json::to_string(record).context("failed to serialize status record");
    }
    let status = match record.status {
        Status::Ok => "ok",
        Status::Error => "error",
    };
    let detail = record
        .url
        .as_deref()
        .or(record.message.as_deref())
        .unwrap_or_default();
    Ok(format!(
        "{}({status}): {} [{detail}]",
        record.action,
        record.path.display()
    ))
}

fn run_compute(args: &ArgMatches) -> Result<()> {
    let request = compute_request(args)?;
    let config = ComputeConfig::load(&request.dataset)?;
    logging::init(&config.log);
    let json = args.get_flag("json");

    let orchestrator = Orchestrator::new(GitAnnexBackend::new()).with_config(config);
    let mut stdout = std::io::stdout().lock();
    let mut print_error = None;
    let result = orchestrator.run_with(&request, |record| {
        let printed = render(&record, json).and_then(|line| {
            writeln!(stdout, "{line}").context("failed to write status record")
        });
        if let Err(err) = printed {
            print_error.get_or_insert(err);
        }
    });

    if let Err(err) = result {
        let failed = StatusRecord::failed(request.dataset.clone(), err.to_string());
        writeln!(stdout, "{}", render(&failed, json)?).context("failed to write status record")?;
        return Err(err).with_context(|| format!("compute '{}' failed", request.method));
    }
    print_error.map_or(Ok(()), Err)
}

fn run_provision(args: &ArgMatches) -> Result<()> {
    let dataset = dataset_path(args)?;
    let config = ComputeConfig::load(&dataset)?;
    logging::init(&config.log);

    let provisioner =
        Provisioner::new(GitAnnexBackend::new()).with_workspace_root(config.workspace_root());

    if let Some(workspace) = args.get_one::<PathBuf>("delete") {
        return provisioner
            .un_provision(&dataset, workspace)
            .with_context(|| format!("failed to remove workspace {}", workspace.display()));
    }

    let branch = args.get_one::<String>("branch").map(String::as_str);
    let workspace = provisioner
        .provision(&dataset, branch, &paths(args, "input"))
        .context("failed to provision workspace")?;
    println!("{}", workspace.path().display());
    Ok(())
}
