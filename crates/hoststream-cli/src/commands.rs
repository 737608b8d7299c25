//! Command-line arguments and the commands they run.

use std::{
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use hoststream_client::{ClientConfig, HostSystem, TcpTransport, Wait};
use hoststream_core::{Credentials, SystemEnv};
use hoststream_proto::{
    Ccsid, ServerId,
    dataqueue::QueueName,
    header::DEFAULT_MAX_LENGTH,
    signon::HostTimestamp,
};

use crate::{decode, error::CliError};

/// Host data-stream tool
#[derive(Parser, Debug)]
#[command(name = "hoststream", author, version, about, long_about = None)]
pub struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Where to connect and who to be.
#[derive(Args, Debug, Clone)]
pub struct Connection {
    /// Host name or address
    #[arg(long, env = "HOSTSTREAM_HOST")]
    pub host: String,

    /// User profile
    #[arg(short, long, env = "HOSTSTREAM_USER")]
    pub user: String,

    /// Password
    #[arg(long, env = "HOSTSTREAM_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Seconds to wait for each reply
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Signon server port, when not the well-known one
    #[arg(long)]
    pub signon_port: Option<u16>,
}

/// What to do.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Explain a captured data stream given as hex
    Decode {
        /// Hex bytes; read from the file when omitted
        hex: Option<String>,

        /// File holding the hex dump
        #[arg(short, long, value_name = "FILE", conflicts_with = "hex")]
        file: Option<PathBuf>,

        /// Input is DSS segments (DDM) rather than data streams
        #[arg(long)]
        dss: bool,
    },

    /// Sign on and show the signon details
    Signon(Connection),

    /// List a directory
    Ls {
        #[command(flatten)]
        connection: Connection,
        /// Directory path
        path: String,
    },

    /// Write a file's contents to standard output
    Cat {
        #[command(flatten)]
        connection: Connection,
        /// File path
        path: String,
    },

    /// Upload a local file
    Put {
        #[command(flatten)]
        connection: Connection,
        /// Local file
        local: PathBuf,
        /// Target path on the host
        remote: String,
        /// CCSID to tag the new file with
        #[arg(long, default_value_t = 1208)]
        ccsid: u16,
    },

    /// Write a text entry to a data queue
    DqWrite {
        #[command(flatten)]
        connection: Connection,
        /// Queue as LIBRARY/NAME
        queue: String,
        /// Entry text
        text: String,
        /// Key for keyed queues
        #[arg(long)]
        key: Option<String>,
        /// CCSID the entry is encoded in
        #[arg(long, default_value_t = 37)]
        ccsid: Ccsid,
    },

    /// Read one entry from a data queue
    DqRead {
        #[command(flatten)]
        connection: Connection,
        /// Queue as LIBRARY/NAME
        queue: String,
        /// Seconds to wait; negative waits forever
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        wait: i64,
        /// Leave the entry on the queue
        #[arg(long)]
        peek: bool,
        /// CCSID the entry is encoded in
        #[arg(long, default_value_t = 37)]
        ccsid: Ccsid,
    },

    /// List spooled files
    SpoolList {
        #[command(flatten)]
        connection: Connection,
        /// Only this user's files
        #[arg(long)]
        owner: Option<String>,
        /// Only files on this output queue
        #[arg(long)]
        output_queue: Option<String>,
    },

    /// Run the DDM security exchange and show the server attributes
    DdmCheck(Connection),
}

type System = HostSystem<TcpTransport, SystemEnv>;

fn connect(connection: &Connection) -> Result<System, CliError> {
    let mut config = ClientConfig::new(connection.host.as_str());
    config.request_timeout = Duration::from_secs(connection.timeout);
    if let Some(port) = connection.signon_port {
        config = config.with_port(ServerId::Signon, port);
    }
    let credentials = Credentials::new(&connection.user, connection.password.clone());
    Ok(HostSystem::new(TcpTransport, SystemEnv, config, credentials)?)
}

fn stamp(value: Option<&HostTimestamp>) -> String {
    value.map_or_else(
        || "-".to_string(),
        |t| format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", t.year, t.month, t.day, t.hour, t.minute, t.second),
    )
}

fn wait(seconds: i64) -> Wait {
    match u32::try_from(seconds) {
        Ok(0) => Wait::NoWait,
        Ok(s) => Wait::Seconds(s),
        Err(_) if seconds < 0 => Wait::Forever,
        Err(_) => Wait::Seconds(u32::MAX),
    }
}

/// Run `cli`, writing results to standard output.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let mut out = io::stdout();
    match cli.command {
        Command::Decode { hex, file, dss } => {
            let text = match (hex, file) {
                (Some(hex), _) => hex,
                (None, Some(path)) => tokio::fs::read_to_string(path).await?,
                (None, None) => return Err(CliError::Usage("give hex bytes or --file".into())),
            };
            let bytes = decode::parse_hex(&text)?;
            let dump = if dss {
                decode::describe_dss(&bytes)?
            } else {
                decode::describe_data_streams(&bytes, DEFAULT_MAX_LENGTH)?
            };
            out.write_all(dump.as_bytes())?;
        },
        Command::Signon(connection) => {
            let system = connect(&connection)?;
            let info = system.signon().await?;
            writeln!(out, "user:            {}", info.user_id)?;
            writeln!(out, "password level:  {}", info.password_level)?;
            writeln!(out, "job:             {}", info.job_name.as_deref().unwrap_or("-"))?;
            if let Some(version) = info.server_version {
                writeln!(out, "server version:  V{}R{}M{}", version >> 16, (version >> 8) & 0xFF, version & 0xFF)?;
            }
            if let Some(ccsid) = info.server_ccsid {
                writeln!(out, "server CCSID:    {ccsid}")?;
            }
            if let Some(details) = &info.signon {
                writeln!(out, "last signon:     {}", stamp(details.last_signon.as_ref()))?;
                writeln!(out, "password expires: {}", stamp(details.password_expiration.as_ref()))?;
            }
            system.close().await;
        },
        Command::Ls { connection, path } => {
            let system = connect(&connection)?;
            let entries = system.ifs().await?.list(&path).await?;
            for entry in entries {
                let kind = if entry.is_directory() { 'd' } else { '-' };
                writeln!(out, "{kind} {:>12} {}", entry.size, entry.name)?;
            }
            system.close().await;
        },
        Command::Cat { connection, path } => {
            let system = connect(&connection)?;
            let contents = system.ifs().await?.read(&path).await?;
            tracing::debug!(ccsid = contents.data_ccsid, bytes = contents.data.len(), "file read");
            out.write_all(&contents.data)?;
            system.close().await;
        },
        Command::Put { connection, local, remote, ccsid } => {
            let data = tokio::fs::read(&local).await?;
            let system = connect(&connection)?;
            system.ifs().await?.write(&remote, &data, ccsid).await?;
            writeln!(out, "wrote {} bytes to {remote}", data.len())?;
            system.close().await;
        },
        Command::DqWrite { connection, queue, text, key, ccsid } => {
            let queue = QueueName::parse_qualified(&queue)?;
            let system = connect(&connection)?;
            let codec = system.codec(ccsid).await?;
            let entry = Bytes::from(codec.encode(&text)?);
            let key = key.map(|k| codec.encode(&k)).transpose()?.map(Bytes::from);
            system.data_queues().await?.write(&queue, entry, key).await?;
            system.close().await;
        },
        Command::DqRead { connection, queue, wait: seconds, peek, ccsid } => {
            let queue = QueueName::parse_qualified(&queue)?;
            let system = connect(&connection)?;
            let codec = system.codec(ccsid).await?;
            let client = system.data_queues().await?;
            let entry = if peek {
                client.peek(&queue, wait(seconds)).await?
            } else {
                client.read(&queue, wait(seconds)).await?
            };
            match entry {
                Some(entry) => writeln!(out, "{}", codec.decode(&entry.entry)?)?,
                None => writeln!(out, "(no entry)")?,
            }
            system.close().await;
        },
        Command::SpoolList { connection, owner, output_queue } => {
            let system = connect(&connection)?;
            let files = system.print().await?.list(owner.as_deref(), output_queue.as_deref()).await?;
            for file in files {
                writeln!(
                    out,
                    "{:<28} {:<10} {:>5} {:<8} {}",
                    file.id.to_string(),
                    file.attributes.output_queue,
                    file.attributes.total_pages,
                    file.attributes.status,
                    file.attributes.user_data,
                )?;
            }
            system.close().await;
        },
        Command::DdmCheck(connection) => {
            let system = connect(&connection)?;
            let client = system.ddm().await?;
            if let Some(attributes) = client.server_attributes() {
                writeln!(
                    out,
                    "{} {} release {}",
                    attributes.server_class, attributes.server_name, attributes.release_level
                )?;
            }
            writeln!(out, "security check passed")?;
        },
    }
    out.flush()?;
    Ok(())
}
