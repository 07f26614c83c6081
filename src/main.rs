//! certvault CLI.
//!
//! Thin adapter over the library: argument parsing, password prompts, and
//! stdout/file writers. Every command opens the store, runs one operation,
//! and persists on mutation. Exit code is 0 on success and 1 on any
//! failure, with the diagnostic on stderr.

use certvault::ca::hierarchy::{new_intermediate, resolve_signer};
use certvault::ca::issuer::{issue_client, issue_server, ClientRequest, ServerRequest};
use certvault::ca::revocation::{revoke, revoked_certs};
use certvault::ca::{crl, lookup};
use certvault::prompt::Prompter;
use certvault::store::record::{CertKind, CertRecord, Subject};
use certvault::{Result, Vault, VaultError};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "certvault")]
#[command(about = "Small-organization PKI: one encrypted store for CAs, certificates, and CRLs", long_about = None)]
struct Cli {
    /// Certificate store file
    db: PathBuf,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new CA and certificate store
    Init {
        /// Country name for the root subject
        #[arg(short = 'c', long, default_value = "US")]
        country: String,

        /// Organization name for the root subject
        #[arg(short = 'O', long)]
        organization: Option<String>,

        /// Organizational unit for the root subject
        #[arg(short = 'u', long = "organization-unit")]
        organization_unit: Option<String>,

        /// Root CA validity in years
        #[arg(short = 'V', long, default_value_t = 5)]
        validity: u32,

        /// Initialize from an exported JSON dump instead
        #[arg(short = 'j', long = "from-json")]
        from_json: Option<PathBuf>,

        /// Common name for the root CA
        common_name: Option<String>,
    },

    /// Issue a new server certificate
    Server {
        /// Certificate validity in years
        #[arg(short = 'V', long, default_value_t = 2)]
        validity: u32,

        /// DNS names for the server (comma separated, repeatable)
        #[arg(short = 'd', long = "dnsname", value_delimiter = ',')]
        dns: Vec<String>,

        /// IP addresses for the server (comma separated, repeatable)
        #[arg(short = 'i', long = "ip-address", value_delimiter = ',')]
        ip: Vec<IpAddr>,

        /// Protect the private key with its own passphrase
        #[arg(short = 'p', long)]
        password: bool,

        /// Sign with this CA instead of the root
        #[arg(short = 's', long = "sign-with")]
        sign_with: Option<String>,

        /// Common name for the server
        common_name: String,
    },

    /// Issue a new user (client) certificate
    #[command(alias = "user")]
    Client {
        /// Certificate validity in years
        #[arg(short = 'V', long, default_value_t = 2)]
        validity: u32,

        /// Email address for the user
        #[arg(short = 'e', long)]
        email: Option<String>,

        /// Protect the private key with its own passphrase
        #[arg(short = 'p', long)]
        password: bool,

        /// Sign with this CA instead of the root
        #[arg(short = 's', long = "sign-with")]
        sign_with: Option<String>,

        /// Common name for the user
        common_name: String,
    },

    /// Create an intermediate CA chained to an existing CA
    Intermediate {
        /// CA validity in years
        #[arg(short = 'V', long, default_value_t = 5)]
        validity: u32,

        /// Sign with this CA instead of the root
        #[arg(short = 's', long = "sign-with")]
        sign_with: Option<String>,

        /// Common name for the intermediate CA
        common_name: String,
    },

    /// Revoke one or more certificates
    Delete {
        /// Common names or serials to revoke
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// List certificates in the store
    #[command(alias = "show")]
    List {
        /// Display the root CA certificate
        #[arg(long = "root-ca")]
        root_ca: bool,

        /// Common names or serials to show (default: everything)
        names: Vec<String>,
    },

    /// Export certificates, keys, chains, or a JSON dump
    Export {
        /// Write the cert to F.crt (and the key to F.key)
        #[arg(short = 'o', long)]
        outfile: Option<PathBuf>,

        /// Export all CA certificates in the trust chain
        #[arg(long)]
        chain: bool,

        /// Dump the whole store as JSON
        #[arg(short = 'j', long)]
        json: bool,

        /// Export the root CA certificate in PEM format
        #[arg(long = "root-ca")]
        root_ca: bool,

        /// Common name or serial to export
        name: Option<String>,
    },

    /// Generate a CRL or list revoked certificates
    Crl {
        /// List revoked certificates instead of generating a CRL
        #[arg(short = 'l', long)]
        list: bool,

        /// Write the CRL to this file
        #[arg(short = 'o', long)]
        outfile: Option<PathBuf>,

        /// CRL validity in days
        #[arg(short = 'V', long, default_value_t = 30)]
        validity: u32,

        /// Sign with this CA instead of the root
        #[arg(short = 's', long = "sign-with")]
        sign_with: Option<String>,
    },

    /// Change the store password
    Passwd,
}

/// Interactive password source backed by the terminal.
struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn password(&self, prompt: &str, confirm: bool) -> Result<String> {
        let first = rpassword::prompt_password(format!("{}: ", prompt))?;
        if confirm {
            let second = rpassword::prompt_password("Repeat to confirm: ")?;
            if first != second {
                return Err(VaultError::Parse("passwords do not match".to_string()));
            }
        }
        Ok(first)
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("certvault: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let prompter = TerminalPrompter;

    match cli.command {
        Commands::Init {
            country,
            organization,
            organization_unit,
            validity,
            from_json,
            common_name,
        } => handle_init(
            &cli.db,
            &prompter,
            country,
            organization,
            organization_unit,
            validity,
            from_json,
            common_name,
        ),
        Commands::Server {
            validity,
            dns,
            ip,
            password,
            sign_with,
            common_name,
        } => handle_server(
            &cli.db,
            &prompter,
            validity,
            dns,
            ip,
            password,
            sign_with.as_deref(),
            common_name,
            cli.verbose,
        ),
        Commands::Client {
            validity,
            email,
            password,
            sign_with,
            common_name,
        } => handle_client(
            &cli.db,
            &prompter,
            validity,
            email,
            password,
            sign_with.as_deref(),
            common_name,
            cli.verbose,
        ),
        Commands::Intermediate {
            validity,
            sign_with,
            common_name,
        } => handle_intermediate(
            &cli.db,
            &prompter,
            validity,
            sign_with.as_deref(),
            common_name,
            cli.verbose,
        ),
        Commands::Delete { names } => handle_delete(&cli.db, &prompter, names),
        Commands::List { root_ca, names } => {
            handle_list(&cli.db, &prompter, root_ca, names, cli.verbose)
        }
        Commands::Export {
            outfile,
            chain,
            json,
            root_ca,
            name,
        } => handle_export(
            &cli.db,
            &prompter,
            outfile.as_deref(),
            chain,
            json,
            root_ca,
            name.as_deref(),
        ),
        Commands::Crl {
            list,
            outfile,
            validity,
            sign_with,
        } => handle_crl(
            &cli.db,
            &prompter,
            list,
            outfile.as_deref(),
            validity,
            sign_with.as_deref(),
        ),
        Commands::Passwd => handle_passwd(&cli.db, &prompter),
    }
}

fn open_vault(db: &Path, prompter: &dyn Prompter) -> Result<Vault> {
    let password = prompter.password("Enter password for store", false)?;
    Vault::open(db, &password)
}

/// Requested validity in years as a duration (365.25 days per year).
fn years(n: u32) -> Duration {
    Duration::days(365 * i64::from(n)) + Duration::hours(6 * i64::from(n))
}

#[allow(clippy::too_many_arguments)]
fn handle_init(
    db: &Path,
    prompter: &dyn Prompter,
    country: String,
    organization: Option<String>,
    organization_unit: Option<String>,
    validity: u32,
    from_json: Option<PathBuf>,
    common_name: Option<String>,
) -> Result<()> {
    if let Some(json_path) = from_json {
        let json = std::fs::read_to_string(&json_path)?;
        let password = prompter.password("Enter password for store", true)?;
        let vault = Vault::import_json(db, &password, &json)?;

        println!(
            "Imported store {} ({} certificates)",
            db.display(),
            vault.certs().count()
        );
        return Ok(());
    }

    let common_name = common_name
        .ok_or_else(|| VaultError::Parse("missing common name for the root CA".to_string()))?;

    let subject = Subject {
        common_name,
        country: Some(country).filter(|c| !c.is_empty()),
        organization: organization.filter(|o| !o.is_empty()),
        organizational_unit: organization_unit.filter(|u| !u.is_empty()),
    };

    let password = prompter.password("Enter password for store", true)?;
    let vault = Vault::create(db, &password, subject, years(validity))?;

    let root = vault.root()?;
    println!(
        "Created store {} with root CA '{}' (serial {:#x})",
        db.display(),
        root.common_name(),
        root.serial
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_server(
    db: &Path,
    prompter: &dyn Prompter,
    validity: u32,
    dns: Vec<String>,
    ip: Vec<IpAddr>,
    ask_password: bool,
    sign_with: Option<&str>,
    common_name: String,
    verbose: bool,
) -> Result<()> {
    let mut vault = open_vault(db, prompter)?;
    let signer = resolve_signer(&vault, sign_with)?;

    let key_passphrase = if ask_password {
        let prompt = format!("Enter private-key password for server '{}'", common_name);
        Some(prompter.password(&prompt, true)?)
    } else {
        None
    };

    let issued = issue_server(
        &mut vault,
        signer,
        ServerRequest {
            common_name: common_name.clone(),
            dns_names: dns,
            ip_addresses: ip,
            validity: years(validity),
            key_passphrase,
        },
    )?;
    vault.persist()?;

    if let Some(warning) = &issued.warning {
        eprintln!("certvault: warning: {warning}");
    }
    println!(
        "Issued server certificate '{}' (serial {:#x})",
        common_name, issued.serial
    );
    if verbose {
        if let Some(record) = vault.get(issued.serial) {
            print!("{}", record.cert_pem());
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_client(
    db: &Path,
    prompter: &dyn Prompter,
    validity: u32,
    email: Option<String>,
    ask_password: bool,
    sign_with: Option<&str>,
    common_name: String,
    verbose: bool,
) -> Result<()> {
    let mut vault = open_vault(db, prompter)?;
    let signer = resolve_signer(&vault, sign_with)?;

    let key_passphrase = if ask_password {
        let prompt = format!("Enter private-key password for user '{}'", common_name);
        Some(prompter.password(&prompt, true)?)
    } else {
        None
    };

    let issued = issue_client(
        &mut vault,
        signer,
        ClientRequest {
            common_name: common_name.clone(),
            email,
            validity: years(validity),
            key_passphrase,
        },
    )?;
    vault.persist()?;

    println!(
        "Issued client certificate '{}' (serial {:#x})",
        common_name, issued.serial
    );
    if verbose {
        if let Some(record) = vault.get(issued.serial) {
            print!("{}", record.cert_pem());
        }
    }
    Ok(())
}

fn handle_intermediate(
    db: &Path,
    prompter: &dyn Prompter,
    validity: u32,
    sign_with: Option<&str>,
    common_name: String,
    verbose: bool,
) -> Result<()> {
    let mut vault = open_vault(db, prompter)?;
    let signer = resolve_signer(&vault, sign_with)?;

    let serial = new_intermediate(&mut vault, signer, &common_name, years(validity))?;
    vault.persist()?;

    println!(
        "Created intermediate CA '{}' (serial {:#x})",
        common_name, serial
    );
    if verbose {
        if let Some(record) = vault.get(serial) {
            print!("{}", record.cert_pem());
        }
    }
    Ok(())
}

fn handle_delete(db: &Path, prompter: &dyn Prompter, names: Vec<String>) -> Result<()> {
    let mut vault = open_vault(db, prompter)?;

    // One bad name must not abort the rest of the batch.
    let mut gone = 0;
    for name in &names {
        match revoke(&mut vault, name) {
            Ok(serial) => {
                gone += 1;
                println!("Revoked '{}' (serial {:#x})", name, serial);
            }
            Err(err) => eprintln!("certvault: {name}: {err}"),
        }
    }

    if gone > 0 {
        vault.persist()?;
        println!(
            "Don't forget to generate a new CRL ({} {} crl)",
            env!("CARGO_BIN_NAME"),
            db.display()
        );
    }
    Ok(())
}

fn handle_list(
    db: &Path,
    prompter: &dyn Prompter,
    root_ca: bool,
    names: Vec<String>,
    verbose: bool,
) -> Result<()> {
    let vault = open_vault(db, prompter)?;
    let now = Utc::now().timestamp();

    if root_ca {
        let root = vault.root()?;
        println!("CA Certificate:");
        print!("{}", root.cert_pem());
        return Ok(());
    }

    if names.is_empty() {
        let root = vault.root()?;
        print_summary(root, now, verbose);

        for record in vault.certs().filter(|c| !c.kind.is_ca()) {
            print_summary(record, now, verbose);
        }
        for record in vault
            .certs()
            .filter(|c| c.kind == CertKind::IntermediateCa)
        {
            print_summary(record, now, verbose);
        }
        return Ok(());
    }

    for name in &names {
        match lookup::find(&vault, name) {
            Ok(matched) => {
                if let Some(record) = vault.get(matched.serial()) {
                    print_summary(record, now, verbose);
                }
            }
            Err(err) => eprintln!("certvault: {name}: {err}"),
        }
    }
    Ok(())
}

fn print_summary(record: &CertRecord, now: i64, verbose: bool) {
    let status = if let Some(revoked_at) = record.revoked_at {
        format!("revoked on {}", format_time(revoked_at))
    } else if record.is_expired_at(now) {
        format!("EXPIRED {}", format_time(record.not_after))
    } else {
        format!("valid until {}", format_time(record.not_after))
    };

    println!(
        "{:<20} {:>7} {:#x} ({})",
        record.common_name(),
        record.kind.to_string(),
        record.serial,
        status
    );
    if verbose {
        print!("{}", record.cert_pem());
    }
}

fn format_time(unix_secs: i64) -> String {
    chrono::DateTime::from_timestamp(unix_secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn handle_export(
    db: &Path,
    prompter: &dyn Prompter,
    outfile: Option<&Path>,
    chain: bool,
    json: bool,
    root_ca: bool,
    name: Option<&str>,
) -> Result<()> {
    let vault = open_vault(db, prompter)?;

    if json {
        let dump = vault.export_json()?;
        return write_output(outfile, &dump);
    }

    if root_ca {
        let root = vault.root()?;
        return write_output(outfile, &root.cert_pem());
    }

    let name =
        name.ok_or_else(|| VaultError::Parse("missing common name to export".to_string()))?;
    // Expired certificates can still be exported.
    let serial = lookup::find(&vault, name)?.serial();
    let record = vault
        .get(serial)
        .ok_or_else(|| VaultError::NotFound(name.to_string()))?;

    let cert_output = if chain {
        lookup::chain_pem(&vault, serial)?
    } else {
        record.cert_pem()
    };

    let passphrase = if record.key.is_wrapped() {
        let prompt = format!("Enter private-key password for '{}'", name);
        Some(prompter.password(&prompt, false)?)
    } else {
        None
    };
    let key_output = record.private_key_pem(passphrase.as_deref())?;

    match outfile {
        Some(path) if path.as_os_str() != "-" => {
            let lossy = path.to_string_lossy();
            let base = lossy.strip_suffix(".crt").unwrap_or(&lossy);

            let cert_path = PathBuf::from(format!("{base}.crt"));
            let key_path = PathBuf::from(format!("{base}.key"));

            std::fs::write(&cert_path, &cert_output)?;
            write_key_file(&key_path, &key_output)?;

            println!(
                "Exported '{}' to {} and {}",
                name,
                cert_path.display(),
                key_path.display()
            );
        }
        _ => {
            print!("{cert_output}");
            print!("{key_output}");
        }
    }
    Ok(())
}

fn handle_crl(
    db: &Path,
    prompter: &dyn Prompter,
    list: bool,
    outfile: Option<&Path>,
    validity: u32,
    sign_with: Option<&str>,
) -> Result<()> {
    let vault = open_vault(db, prompter)?;

    if list {
        for (revoked_at, record) in revoked_certs(&vault) {
            println!(
                "{:<20} {:#x} revoked on {}",
                record.common_name(),
                record.serial,
                format_time(revoked_at)
            );
        }
        return Ok(());
    }

    let signer = resolve_signer(&vault, sign_with)?;
    let crl_pem = crl::build_crl(&vault, signer, validity)?;
    write_output(outfile, &crl_pem)
}

fn handle_passwd(db: &Path, prompter: &dyn Prompter) -> Result<()> {
    let old_password = prompter.password("Enter old password for store", false)?;
    let mut vault = Vault::open(db, &old_password)?;

    let new_password = prompter.password("Enter new password for store", true)?;
    vault.rekey(&new_password)?;

    println!("Store password changed");
    Ok(())
}

fn write_output(outfile: Option<&Path>, contents: &str) -> Result<()> {
    match outfile {
        Some(path) if path.as_os_str() != "-" => std::fs::write(path, contents)?,
        _ => print!("{contents}"),
    }
    Ok(())
}

/// Write a private key with owner-only permissions.
fn write_key_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
