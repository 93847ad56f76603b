use clap::{Args, Parser, Subcommand, ValueEnum};
use datamapper::{Changeset, Config, Query, Raw, RawRow, Record, Repo, Schema};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::process;

/// datamapper CLI: query and edit a SQLite database through a YAML schema
#[derive(Parser)]
#[command(name = "datamapper", version, about)]
struct Cli {
    /// Path to the schema file
    #[arg(long, env = "DATAMAPPER_SCHEMA")]
    schema: Option<PathBuf>,

    /// Path to the SQLite database (":memory:" for a throwaway one)
    #[arg(long, env = "DATAMAPPER_DATABASE")]
    database: Option<String>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

/// Options shared by every command that builds a query.
#[derive(Args)]
struct QueryArgs {
    /// Model name
    model: String,
    /// Filters with optional operator suffix (e.g. --filter name__startswith=Ra)
    #[arg(long = "filter", value_parser = parse_key_value)]
    filters: Vec<(String, String)>,
    /// Order by a field, "-" prefix for descending (e.g. --order -id)
    #[arg(long = "order")]
    order: Vec<String>,
    /// Join an association path (e.g. --join pets)
    #[arg(long = "join")]
    joins: Vec<String>,
    #[arg(long)]
    limit: Option<u64>,
    #[arg(long)]
    offset: Option<u64>,
    /// Preload an association path (e.g. --preload pets.owner)
    #[arg(long = "preload")]
    preloads: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Create tables for every model in the schema
    Init,

    /// List records matching a query
    All(QueryArgs),

    /// First record matching a query
    First(QueryArgs),

    /// Get a single record by primary key
    Get {
        /// Model name
        model: String,
        /// Primary key value
        id: String,
        /// Preload an association path
        #[arg(long = "preload")]
        preloads: Vec<String>,
    },

    /// Count records matching a query
    Count(QueryArgs),

    /// Insert a new record
    Insert {
        /// Model name
        model: String,
        /// Field values (e.g. --field name="Alice Chen")
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Update a record by primary key
    Update {
        /// Model name
        model: String,
        /// Primary key value
        id: String,
        /// Field values to change
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete a record by primary key
    Delete {
        /// Model name
        model: String,
        /// Primary key value
        id: String,
        /// Show what would be deleted without deleting it
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete every record matching a query
    DeleteAll(QueryArgs),

    /// Run a raw SQL statement
    Sql {
        statement: String,
        /// Positional parameters, bound in order
        #[arg(long = "param")]
        params: Vec<String>,
        /// Materialize rows as records of this model
        #[arg(long)]
        model: Option<String>,
    },

    /// Show the SQL a query compiles to
    Explain(QueryArgs),

    /// Show the models declared in the schema
    Models,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn open_repo(cli: &Cli) -> Result<Repo, Box<dyn std::error::Error>> {
    let mut config = Config::from_env()?;
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    if let Some(schema) = &cli.schema {
        config.schema = Some(schema.clone());
    }
    log::debug!("resolved config: {config:?}");
    let schema = Schema::from_path(config.schema_path()?)?;
    Ok(Repo::from_config(&config, schema)?)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let repo = open_repo(&cli)?;

    match &cli.command {
        Command::Init => {
            repo.create_tables()?;
            let models: Vec<&str> = repo.schema().models().map(|m| m.name()).collect();
            print_output(&json!({ "ok": true, "models": models }), &cli.format)?;
        }

        Command::All(args) => {
            let records = repo.all(&build_query(&repo, args)?)?;
            print_output(&records_to_value(&records), &cli.format)?;
        }

        Command::First(args) => {
            let record = repo.first(&build_query(&repo, args)?)?;
            let value = record.as_ref().map_or(Value::Null, Record::to_json);
            print_output(&value, &cli.format)?;
        }

        Command::Get { model, id, preloads } => {
            let record = repo.get(model.as_str(), parse_value(id))?;
            let record = repo.preload_record(record, preloads)?;
            print_output(&record.to_json(), &cli.format)?;
        }

        Command::Count(args) => {
            let count = repo.count(&build_query(&repo, args)?)?;
            print_output(&json!({ "count": count }), &cli.format)?;
        }

        Command::Insert { model, fields } => {
            let record = repo.schema().record(model)?;
            let params = fields_to_map(fields);
            let permitted: Vec<&str> = params.keys().map(String::as_str).collect();
            let model_def = Arc::clone(record.model());
            let required: Vec<&str> = model_def
                .fields()
                .iter()
                .filter(|(_, field)| field.required)
                .map(|(name, _)| name.as_str())
                .collect();
            let changeset = Changeset::new(record)
                .cast(&params, &permitted)
                .validate_required(&required);
            let inserted = repo.insert(changeset)?;
            print_output(&inserted.to_json(), &cli.format)?;
        }

        Command::Update { model, id, fields } => {
            let record = repo.get(model.as_str(), parse_value(id))?;
            let params = fields_to_map(fields);
            let permitted: Vec<&str> = params.keys().map(String::as_str).collect();
            let updated = repo.update(Changeset::new(record).cast(&params, &permitted))?;
            print_output(&updated.to_json(), &cli.format)?;
        }

        Command::Delete { model, id, dry_run } => {
            let record = repo.get(model.as_str(), parse_value(id))?;
            if *dry_run {
                print_output(
                    &json!({ "dry_run": true, "would_delete": record.to_json() }),
                    &cli.format,
                )?;
            } else {
                let deleted = repo.delete(record)?;
                print_output(&json!({ "ok": true, "deleted": deleted.to_json() }), &cli.format)?;
            }
        }

        Command::DeleteAll(args) => {
            let deleted = repo.delete_all(&build_query(&repo, args)?)?;
            print_output(&json!({ "ok": true, "deleted": deleted }), &cli.format)?;
        }

        Command::Sql {
            statement,
            params,
            model,
        } => {
            let mut raw = Raw::new(statement.as_str())?;
            for param in params {
                raw = raw.bind(parse_value(param));
            }
            if let Some(model) = model {
                raw = raw.with_model(repo.schema().model(model)?);
            }
            if raw.is_query() {
                let rows: Vec<Value> = repo
                    .raw(&raw)?
                    .into_iter()
                    .map(|row| match row {
                        RawRow::Row(map) => Value::Object(map),
                        RawRow::Record(record) => record.to_json(),
                    })
                    .collect();
                print_output(&Value::Array(rows), &cli.format)?;
            } else {
                let affected = repo.execute_raw(&raw)?;
                print_output(&json!({ "ok": true, "affected": affected }), &cli.format)?;
            }
        }

        Command::Explain(args) => {
            let statement = build_query(&repo, args)?.to_sql(repo.schema())?;
            print_output(
                &json!({ "sql": statement.sql, "params": statement.params }),
                &cli.format,
            )?;
        }

        Command::Models => {
            let models: Vec<Value> = repo
                .schema()
                .models()
                .map(|model| {
                    let fields: Map<String, Value> = model
                        .fields()
                        .iter()
                        .map(|(name, field)| (name.clone(), json!(field.field_type.human_name())))
                        .collect();
                    let associations: Map<String, Value> = model
                        .associations()
                        .iter()
                        .map(|(name, assoc)| {
                            (
                                name.clone(),
                                json!({ "kind": assoc.kind(), "model": assoc.related() }),
                            )
                        })
                        .collect();
                    json!({
                        "name": model.name(),
                        "table": model.table(),
                        "primary_key": model.primary_key(),
                        "fields": fields,
                        "associations": associations,
                    })
                })
                .collect();
            print_output(&Value::Array(models), &cli.format)?;
        }
    }

    Ok(())
}

fn build_query(repo: &Repo, args: &QueryArgs) -> Result<Query, Box<dyn std::error::Error>> {
    let mut query = repo.schema().query(&args.model)?;
    for path in &args.joins {
        query = query.join(path, None);
    }
    for (key, value) in &args.filters {
        query = query.filter(key, parse_value(value));
    }
    for key in &args.order {
        query = query.order_by(key);
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }
    if let Some(offset) = args.offset {
        query = query.offset(offset);
    }
    for path in &args.preloads {
        query = query.preload(path);
    }
    Ok(query)
}

fn records_to_value(records: &[Record]) -> Value {
    Value::Array(records.iter().map(Record::to_json).collect())
}

fn print_output(value: &Value, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// JSON when it parses (numbers, booleans, arrays), plain string otherwise.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn fields_to_map(fields: &[(String, String)]) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), parse_value(value)))
        .collect()
}
