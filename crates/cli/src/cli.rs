use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "kiosk")]
#[command(about = "Marketplace seller automation - session, posting loop, auto-replies")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file (JSON); defaults apply for anything missing
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Force a visible browser window even when a saved session exists
	#[arg(long, global = true)]
	pub headful: bool,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run the posting loop with the inbound-chat watch until interrupted
	Run,

	/// Show the account balance
	#[command(alias = "bal")]
	Balance,

	/// Show per-status trade totals
	Totals,

	/// List active (paid) orders
	Orders {
		/// Maximum orders to show
		#[arg(short, long, default_value = "20")]
		limit: usize,
	},

	/// List dialogs from the chat page
	Dialogs {
		/// Only unread dialogs
		#[arg(long)]
		unread: bool,
	},

	/// Send a message into one conversation
	Reply { conversation_id: String, text: String },

	/// Reply to the first unread dialog (or the first dialog at all)
	ReplyFirst { text: String },

	/// Log in with credentials, waiting for manual captcha completion.
	/// With no arguments, saved credentials are used.
	Login {
		login: Option<String>,
		password: Option<String>,
		/// Persist the credentials for later runs
		#[arg(long)]
		save: bool,
	},

	/// Import a session from a raw Cookie header copied out of a browser
	CookieLogin { header: String },

	/// Check whether the saved session still looks signed in
	Status,

	/// Delete the session, credentials, and reply ledger
	Reset,

	/// Clear reply-ledger entries
	Purge {
		/// Only entries older than this many seconds
		#[arg(long, value_name = "SECS")]
		older_than: Option<u64>,
	},
}
