use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use static_site_stack::context::{
    load_context_file, namespace_from_context, parse_override, resolve_context, ContextMap,
    DeployEnvironment, SiteProps,
};
use static_site_stack::deploy::Deployer;
use static_site_stack::site_stack::{stack_name, SitePaths, StaticSiteStack};

#[derive(Parser)]
#[command(name = "static-site", version, about = "Declare and deploy an S3 + CloudFront static website")]
struct Cli {
    /// context file. either cdk.json with a "context" object, or a flat object
    #[arg(long, global = true, default_value = "cdk.json")]
    config: PathBuf,

    /// override a context parameter, e.g. -c namespace=mysite
    #[arg(short = 'c', long = "context", global = true, value_parser = parse_context_arg)]
    context: Vec<(String, String)>,

    /// directory uploaded into the bucket
    #[arg(long, global = true, default_value = "static")]
    assets: PathBuf,

    /// viewer-request function source
    #[arg(long, global = true, default_value = "cf-functions/redirect.js")]
    edge_function: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// write the template and deployment manifest
    Synth {
        #[arg(long, default_value = "cdk.out")]
        out: PathBuf,
    },
    /// synthesize, deploy the stack, and upload the site
    Deploy,
    /// delete the stack, the bucket and its contents
    Destroy,
}

fn parse_context_arg(s: &str) -> Result<(String, String), String> {
    parse_override(s).map_err(|e| e.to_string())
}

fn read_context(cli: &Cli) -> anyhow::Result<ContextMap> {
    let file = if cli.config.exists() {
        load_context_file(&cli.config)?
    } else {
        tracing::warn!(config = ?cli.config, "context file not found, using command line context only");
        ContextMap::new()
    };
    Ok(resolve_context(file, &cli.context))
}

fn build_stack(cli: &Cli, ctx: &ContextMap) -> anyhow::Result<StaticSiteStack> {
    let props = SiteProps::from_context(ctx)?;
    let paths = SitePaths {
        assets_dir: cli.assets.clone(),
        edge_function: cli.edge_function.clone(),
    };
    let site = StaticSiteStack::build(&props, DeployEnvironment::from_env(), &paths)
        .context("Failed to declare the site stack")?;
    Ok(site)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let ctx = read_context(&cli)?;
    match &cli.command {
        Command::Synth { out } => {
            let saved = build_stack(&cli, &ctx)?.synth()?;
            let template_path = saved.write_to_dir(out)
                .with_context(|| format!("Failed to write synthesized stack to {:?}", out))?;
            println!("{}", template_path.display());
        }
        Command::Deploy => {
            let saved = build_stack(&cli, &ctx)?.synth()?;
            let deployer = Deployer::from_environment(&saved.environment).await?;
            let outputs = deployer.deploy(&saved).await
                .with_context(|| format!("Failed to deploy {}", saved.stack_name))?;
            println!("Outputs:");
            for (key, val) in outputs.iter() {
                println!("{}.{key} = {val}", saved.stack_name);
            }
        }
        Command::Destroy => {
            let name = stack_name(&namespace_from_context(&ctx)?);
            let deployer = Deployer::from_environment(&DeployEnvironment::from_env()).await?;
            deployer.destroy(&name).await
                .with_context(|| format!("Failed to destroy {name}"))?;
        }
    }
    Ok(())
}
