use crate::cmd::{open_channel, ConnectArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::session::Session;

pub fn run(args: ConnectArgs) -> CliResult<i32> {
    let config = args.frame.into_config()?;
    let mut channel = open_channel(&args.endpoint, config)?;

    let stdin = std::io::stdin().lock();
    let stdout = std::io::stdout().lock();
    let mut session = Session::new(&mut channel, stdout);
    if args.no_greeting {
        session = session.without_greeting();
    }
    let summary = session.run(stdin)?;

    tracing::info!(
        endpoint = %args.endpoint,
        requests = summary.requests,
        "session closed"
    );
    if let Err(err) = channel.shutdown() {
        tracing::debug!(error = %err, "shutdown after session failed");
    }
    Ok(SUCCESS)
}
