//! Metalware's main application entry point.
//! Handles command-line argument parsing and dispatches to the resolution engine.

use metalware::{
    cli::{get_args, Args, Command},
    error::{default_error_handler, Error, Result},
    settings::load_settings,
    Cluster, ScopeOverrides,
};

/// Main application entry point.
fn main() {
    let args = get_args();

    // Warnings stay visible so unset parameters are reported
    env_logger::Builder::new()
        .filter_level(if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Warn })
        .init();

    if let Err(err) = run(args) {
        default_error_handler(err);
    }
}

fn to_yaml(value: &serde_json::Value) -> Result<String> {
    serde_yaml::to_string(value).map_err(|e| Error::yaml("output", e))
}

fn run(args: Args) -> Result<()> {
    let mut settings = load_settings(&args.root)?;
    if args.strict_answers {
        settings = settings.with_strict_answers(true);
    }
    if let Some(depth) = args.max_depth {
        if depth == 0 {
            return Err(Error::ConfigError("--max-depth must be at least 1".to_string()));
        }
        settings = settings.with_max_render_depth(depth);
    }
    let cluster = Cluster::open(&args.root, settings)?;

    match args.command {
        Command::Render { template, scope } => {
            let scope = ScopeOverrides::from(scope).resolve()?;
            let rendered = cluster.namespace(&scope).render_file(&template)?;
            print!("{rendered}");
        }
        Command::ViewConfig { scope } => {
            let scope = ScopeOverrides::from(scope).resolve()?;
            let config = cluster.namespace(&scope).config()?.to_json()?;
            print!("{}", to_yaml(&config)?);
        }
        Command::ViewAnswers { scope } => {
            let scope = ScopeOverrides::from(scope).resolve()?;
            let answers = cluster.namespace(&scope).answers()?.to_json()?;
            print!("{}", to_yaml(&answers)?);
        }
        Command::ViewAsset { name } => {
            let asset = cluster.assets().get(&name)?.to_json()?;
            print!("{}", to_yaml(&asset)?);
        }
    }
    Ok(())
}
