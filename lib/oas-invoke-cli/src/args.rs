use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use oas_invoke_core::{AuthType, Credentials, SecureString};
use pico_args::Arguments;
use tracing::warn;

use crate::call::CallArgs;

/// Environment variable read when `--spec` is absent.
pub const SPEC_ENV: &str = "OAS_INVOKE_SPEC";

/// Environment variable read when `--root` is absent.
pub const ASSETS_DIR_ENV: &str = "OAS_INVOKE_ASSETS_DIR";

const DEFAULT_ASSETS_ADDR: &str = "127.0.0.1:1880";

/// Usage text.
pub const HELP: &str = "\
oas-invoke

USAGE:
  oas-invoke call --spec <URL> --resource <TAG> --method <OPERATION> [OPTIONS]
  oas-invoke assets [--addr <ADDR>] [--root <DIR>]

CALL OPTIONS:
  -s, --spec <URL>                  API description URL or path [env: OAS_INVOKE_SPEC]
  -r, --resource <TAG>              resource (tag) of the operation
  -m, --method <OPERATION>          operation name
  -p, --payload <JSON|TEXT>         payload, parsed as JSON for JSON content types
      --request-content-type <CT>   request content type override
      --response-content-type <CT>  response content type override
      --auth-type <TYPE>            none, basic, bearer or apikey
      --user <USER>                 user name, or header name for apikey
      --password <SECRET>           password, token or key

ASSETS OPTIONS:
  -a, --addr <ADDR>                 listen address [default: 127.0.0.1:1880]
      --root <DIR>                  directory to serve [env: OAS_INVOKE_ASSETS_DIR]
";

/// A parsed command line.
#[derive(Debug)]
pub enum Command {
    /// Print usage.
    Help,
    /// One-shot invocation.
    Call(CallArgs),
    /// Serve static assets.
    Assets {
        /// Listen address.
        addr: SocketAddr,
        /// Directory to serve.
        root: PathBuf,
    },
}

impl Command {
    /// Parses the process arguments, falling back to the process environment.
    pub fn from_env() -> Result<Self> {
        Self::parse(Arguments::from_env(), |key| std::env::var(key).ok())
    }

    /// Parses `args`, reading fallbacks through `env`.
    pub fn from_vec(args: Vec<OsString>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::parse(Arguments::from_vec(args), env)
    }

    fn parse(mut pargs: Arguments, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if pargs.contains(["-h", "--help"]) {
            return Ok(Self::Help);
        }

        let command = match pargs.subcommand().context("reading subcommand")?.as_deref() {
            Some("call") => Self::Call(parse_call(&mut pargs, &env)?),
            Some("assets") => parse_assets(&mut pargs, &env)?,
            Some(other) => bail!("unknown subcommand '{other}'"),
            None => return Ok(Self::Help),
        };

        let remaining = pargs.finish();
        if !remaining.is_empty() {
            warn!(?remaining, "ignoring unused arguments");
        }

        Ok(command)
    }
}

fn parse_call(pargs: &mut Arguments, env: &impl Fn(&str) -> Option<String>) -> Result<CallArgs> {
    let spec: Option<String> = pargs
        .opt_value_from_str(["-s", "--spec"])
        .context("reading --spec")?;
    let Some(spec) = spec.or_else(|| env(SPEC_ENV)) else {
        bail!("missing --spec (or {SPEC_ENV})");
    };

    let resource = pargs
        .value_from_str(["-r", "--resource"])
        .context("reading --resource")?;
    let method = pargs
        .value_from_str(["-m", "--method"])
        .context("reading --method")?;
    let payload = pargs
        .opt_value_from_str(["-p", "--payload"])
        .context("reading --payload")?;
    let request_content_type = pargs
        .opt_value_from_str("--request-content-type")
        .context("reading --request-content-type")?;
    let response_content_type = pargs
        .opt_value_from_str("--response-content-type")
        .context("reading --response-content-type")?;

    let auth_type: Option<AuthType> = pargs
        .opt_value_from_str("--auth-type")
        .context("reading --auth-type")?;
    let user: Option<String> = pargs.opt_value_from_str("--user").context("reading --user")?;
    let password: Option<String> = pargs
        .opt_value_from_str("--password")
        .context("reading --password")?;

    Ok(CallArgs {
        spec,
        resource,
        method,
        payload,
        request_content_type,
        response_content_type,
        credentials: Credentials {
            auth_type: auth_type.unwrap_or_default(),
            user: user.unwrap_or_default(),
            password: password.map(SecureString::new),
        },
    })
}

fn parse_assets(pargs: &mut Arguments, env: &impl Fn(&str) -> Option<String>) -> Result<Command> {
    let addr: Option<SocketAddr> = pargs
        .opt_value_from_str(["-a", "--addr"])
        .context("reading --addr")?;
    let addr = match addr {
        Some(addr) => addr,
        None => DEFAULT_ASSETS_ADDR
            .parse()
            .context("parsing default address")?,
    };

    let root: Option<PathBuf> = pargs
        .opt_value_from_str("--root")
        .context("reading --root")?;
    let Some(root) = root.or_else(|| env(ASSETS_DIR_ENV).map(PathBuf::from)) else {
        bail!("missing --root (or {ASSETS_DIR_ENV})");
    };

    Ok(Command::Assets { addr, root })
}
