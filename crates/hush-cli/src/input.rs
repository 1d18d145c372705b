//! Interactive command line parsing.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Ask the relay for a fresh client list.
    Refresh,
    /// Print the known peers and their fingerprints.
    Peers,
    /// Print our own fingerprints.
    WhoAmI,
    Private { recipients: Vec<String>, message: String },
    Public { message: String },
    Help,
    Quit,
    Empty,
}

pub const HELP: &str = "\
commands:
  /list                 refresh the peer list from the relay
  /peers                show known peers and fingerprints
  /to alice,bob <text>  encrypted message to the listed peers
  /all <text>           signed public message to everyone
  /whoami               show your own fingerprints
  /help                 this text
  /quit                 leave";

pub fn parse(line: &str) -> Result<Input, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Err("messages need a command, e.g. /all <text> or /to <peers> <text>".into());
    };
    let (cmd, args) = match rest.split_once(char::is_whitespace) {
        Some((cmd, args)) => (cmd, args.trim()),
        None => (rest, ""),
    };

    match cmd {
        "list" | "refresh" => Ok(Input::Refresh),
        "peers" => Ok(Input::Peers),
        "whoami" => Ok(Input::WhoAmI),
        "help" | "?" => Ok(Input::Help),
        "quit" | "exit" => Ok(Input::Quit),
        "all" => {
            if args.is_empty() {
                return Err("usage: /all <text>".into());
            }
            Ok(Input::Public {
                message: args.to_string(),
            })
        }
        "to" => {
            let (who, message) = args
                .split_once(char::is_whitespace)
                .ok_or("usage: /to alice,bob <text>")?;
            let recipients: Vec<String> = who
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
            let message = message.trim();
            if recipients.is_empty() || message.is_empty() {
                return Err("usage: /to alice,bob <text>".into());
            }
            Ok(Input::Private {
                recipients,
                message: message.to_string(),
            })
        }
        other => Err(format!("unknown command /{other}, try /help")),
    }
}
