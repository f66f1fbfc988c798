//! Configuration for the complaint desk
//!
//! CLI arguments and environment variable handling using clap.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use complaint_triage::backend::openai::{DEFAULT_MODEL, GROQ_BASE_URL};
use complaint_triage::{ComplaintCategory, ComplaintStatus, Identity, UserRole};

/// Complaint desk - file, triage and manage citizen complaints
#[derive(Parser, Debug, Clone)]
#[command(name = "triage-desk")]
#[command(about = "Citizen complaint triage desk")]
pub struct Args {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "complaint_desk")]
    pub mongodb_db: String,

    /// OpenAI-compatible API base URL of the oracle
    #[arg(long, env = "ORACLE_BASE_URL", default_value = GROQ_BASE_URL)]
    pub oracle_base_url: String,

    /// Oracle model name
    #[arg(long, env = "ORACLE_MODEL", default_value = DEFAULT_MODEL)]
    pub oracle_model: String,

    /// Oracle API key
    #[arg(long, env = "ORACLE_API_KEY", hide_env_values = true)]
    pub oracle_api_key: Option<String>,

    /// Groq API key, used when ORACLE_API_KEY is unset
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,

    /// Triage configuration file (YAML)
    #[arg(long, env = "TRIAGE_CONFIG")]
    pub triage_config: Option<PathBuf>,

    /// Development mode: fall back to an in-memory store when MongoDB is unreachable
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Acting user
    #[command(flatten)]
    pub actor: ActorArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Identity the command runs as
#[derive(clap::Args, Debug, Clone)]
pub struct ActorArgs {
    /// User id (citizen email, officer id)
    #[arg(long = "as", env = "DESK_USER", default_value = "admin")]
    pub user_id: String,

    /// Role of the acting user
    #[arg(long, env = "DESK_ROLE", default_value = "admin", value_parser = parse_role)]
    pub role: UserRole,

    /// Department of an acting officer
    #[arg(long = "department-id", env = "DESK_DEPARTMENT")]
    pub department_id: Option<String>,
}

impl ActorArgs {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id.clone(),
            role: self.role,
            department_id: self.department_id.clone(),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// File a complaint and triage it
    Submit {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        location: String,
        #[arg(long, default_value = "others", value_parser = parse_category)]
        category: ComplaintCategory,
        #[arg(long)]
        image_url: Option<String>,
    },

    /// Show one complaint
    Show { id: String },

    /// List complaints visible to the acting user
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<ComplaintStatus>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long, default_value = "1000")]
        limit: usize,
    },

    /// Change a complaint's status and/or resolution ETA
    Status {
        id: String,
        #[arg(long, value_parser = parse_status)]
        status: Option<ComplaintStatus>,
        /// RFC 3339 timestamp
        #[arg(long)]
        eta: Option<DateTime<Utc>>,
    },

    /// Attach an uploaded image URL to a complaint
    AttachImage { id: String, url: String },

    /// Show the acting citizen's complaint counts and recent complaints
    Stats,

    /// Run triage again for a stored complaint
    Retriage { id: String },

    /// Register an officer
    AddOfficer {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        department: String,
    },

    /// List a department's officers and their load
    Officers { department: String },

    /// Print the effective triage configuration
    ShowConfig,

    /// Probe the oracle and the store
    Check,
}

fn parse_role(s: &str) -> Result<UserRole, String> {
    s.parse()
}

fn parse_status(s: &str) -> Result<ComplaintStatus, String> {
    s.parse()
}

fn parse_category(s: &str) -> Result<ComplaintCategory, String> {
    s.parse()
}

impl Args {
    /// Key sent to the oracle, if any
    pub fn api_key(&self) -> Option<String> {
        self.oracle_api_key
            .clone()
            .or_else(|| self.groq_api_key.clone())
            .filter(|k| !k.trim().is_empty())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let needs_oracle = !matches!(self.command, Command::ShowConfig);
        if needs_oracle && self.oracle_base_url.contains("api.groq.com") && self.api_key().is_none() {
            return Err("GROQ_API_KEY or ORACLE_API_KEY is required for the Groq API".to_string());
        }

        if self.actor.role == UserRole::Officer && self.actor.department_id.is_none() {
            return Err("--department-id is required when acting as an officer".to_string());
        }

        if let Command::List { limit: 0, .. } = self.command {
            return Err("--limit must be at least 1".to_string());
        }

        Ok(())
    }
}
