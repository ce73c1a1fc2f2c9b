pub mod authority;
pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_listing;
pub mod io_xlsx;
pub mod store_json;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use canvass_core::bulk::{import_rows, ImportSummary, RawRow};
use canvass_core::flow::{Authority, RecordStore, VerificationFlow};
use canvass_core::territory::{TerritoryCache, TerritoryIndex};
use canvass_core::*;
use log::{debug, info, warn};
use serde_json::Value as JSValue;
use snafu::{prelude::*, Snafu};
use text_diff::print_diff;

use crate::args::{Args, ClaimArgs, Command};
use crate::canvass::authority::build_authority;
use crate::canvass::config_reader::*;
use crate::canvass::io_common::simplify_file_name;
use crate::canvass::store_json::JsonStore;

#[derive(Debug, Snafu)]
pub enum CanvassError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The spreadsheet {path} has no worksheet"))]
    EmptyExcel { path: String },
    #[snafu(display("The spreadsheet {path} has no worksheet named {name}"))]
    MissingWorksheet { path: String, name: String },
    #[snafu(display("Error reading file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing to JSON"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error parsing line {lineno} of the CSV file"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Invalid authority configuration: {message}"))]
    AuthorityConfig { message: String },
    #[snafu(display("{source}"))]
    Registry { source: RegistryError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CanvassResult<T> = Result<T, CanvassError>;

fn claim_from_args(claim: &ClaimArgs) -> LocationClaim {
    LocationClaim {
        department: claim.department.clone(),
        municipality: claim.municipality.clone(),
        voting_station: claim.voting_station.clone(),
        polling_table: claim.polling_table.clone(),
        address: claim.station_address.clone(),
    }
}

// The flags that were passed replace the matching fields of `current`.
fn merge_claim(current: &LocationClaim, claim: &ClaimArgs) -> Option<LocationClaim> {
    let given = claim_from_args(claim);
    let mut res = current.clone();
    let mut changed = false;
    for field in LocationField::ALL.iter() {
        if let Some(v) = given.get(*field) {
            res.set(*field, Some(v.to_string()));
            changed = true;
        }
    }
    if changed {
        Some(res)
    } else {
        None
    }
}

fn parse_state(label: &str) -> CanvassResult<ValidationState> {
    match ValidationState::parse(label) {
        Some(s) => Ok(s),
        None => whatever!(
            "unknown validation state {:?}, expected one of unverified, verified, revision, inconsistent",
            label
        ),
    }
}

// A blank label clears the gender.
fn parse_gender(label: &str) -> CanvassResult<Option<Gender>> {
    if label.trim().is_empty() {
        return Ok(None);
    }
    match Gender::parse(label) {
        Some(g) => Ok(Some(g)),
        None => whatever!("unknown gender {:?}, expected one of M, F, Otro", label),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> CanvassResult<JSValue> {
    serde_json::to_value(value).context(WritingJsonSnafu {})
}

/// Everything a command needs: the configuration and the collaborators it names.
pub struct Registry {
    pub config: LoadedConfig,
    pub authority: Box<dyn Authority>,
    pub territory: Option<Arc<TerritoryIndex>>,
    pub store: JsonStore,
}

impl Registry {
    pub fn open(config: LoadedConfig) -> CanvassResult<Registry> {
        let authority = build_authority(&config)?;
        let territory = match (&config.config.territory_source, config.listing_path()) {
            (Some(source), Some(path)) => {
                let mut cache = TerritoryCache::new(source.listing_format()?);
                Some(io_listing::load_listing(&path, &mut cache)?)
            }
            _ => None,
        };
        let store = JsonStore::open(&config.store_path())?;
        Ok(Registry {
            config,
            authority,
            territory,
            store,
        })
    }
}

fn make_flow<'a>(
    config: &LoadedConfig,
    authority: &'a dyn Authority,
    territory: &Option<Arc<TerritoryIndex>>,
) -> VerificationFlow<'a> {
    let flow = VerificationFlow::new(
        authority,
        config.config.verification,
        config.config.import_rules.clone(),
    );
    match territory {
        Some(index) => flow.with_territory(index.clone()),
        None => flow,
    }
}

pub fn run_territory(
    config: &LoadedConfig,
    listing: Option<&str>,
    department: Option<&str>,
    municipality: Option<&str>,
    station: Option<&str>,
) -> CanvassResult<JSValue> {
    let format = match &config.config.territory_source {
        Some(source) => source.listing_format()?,
        None => Default::default(),
    };
    let path = match (listing, config.listing_path()) {
        (Some(p), _) => Path::new(p).to_path_buf(),
        (None, Some(p)) => p,
        (None, None) => whatever!("No territory listing: pass --listing or set territorySource"),
    };
    let mut cache = TerritoryCache::new(format);
    let index = io_listing::load_listing(&path, &mut cache)?;
    // The lookups take the listing spelling of each level.
    let d = department.map(|d| index.canonical_department(d).unwrap_or(d));
    let m = match (d, municipality) {
        (Some(d), Some(m)) => Some(index.canonical_municipality(d, m).unwrap_or(m)),
        _ => None,
    };
    let s = match (d, m, station) {
        (Some(d), Some(m), Some(s)) => Some(index.canonical_station(d, m, s).unwrap_or(s)),
        _ => None,
    };
    let level: &[String] = match (d, m, s) {
        (None, _, _) => index.departments(),
        (Some(d), None, _) => index.municipalities(d),
        (Some(d), Some(m), None) => index.stations(d, m),
        (Some(d), Some(m), Some(s)) => index.addresses(d, m, s),
    };
    to_json(&level)
}

pub fn run_verify(reg: &Registry, national_id: &str, claim: &ClaimArgs) -> CanvassResult<JSValue> {
    let flow = make_flow(&reg.config, reg.authority.as_ref(), &reg.territory);
    let res = flow
        .verify_claim(national_id, &claim_from_args(claim))
        .context(RegistrySnafu {})?;
    to_json(&res)
}

pub fn run_register(reg: &mut Registry, draft: &VoterDraft, verify: bool) -> CanvassResult<JSValue> {
    let flow = make_flow(&reg.config, reg.authority.as_ref(), &reg.territory);
    let record = flow
        .register(&mut reg.store, draft, verify)
        .context(RegistrySnafu {})?;
    reg.store.save()?;
    info!("Registered record {} ({})", record.id, record.state);
    to_json(&record)
}

pub fn run_reverify(reg: &mut Registry, id: RecordId) -> CanvassResult<JSValue> {
    let flow = make_flow(&reg.config, reg.authority.as_ref(), &reg.territory);
    let record = flow.reverify(&mut reg.store, id).context(RegistrySnafu {})?;
    reg.store.save()?;
    info!("Record {} is now {}", record.id, record.state);
    to_json(&record)
}

pub fn run_edit(
    reg: &mut Registry,
    id: RecordId,
    patch: RecordPatch,
    claim: &ClaimArgs,
) -> CanvassResult<JSValue> {
    let current = reg
        .store
        .get(id)
        .and_then(|r| r.ok_or(RegistryError::RecordNotFound(id)))
        .context(RegistrySnafu {})?;
    let patch = RecordPatch {
        location: merge_claim(&current.location, claim),
        ..patch
    };
    debug!("run_edit: {:?}", patch);
    let flow = make_flow(&reg.config, reg.authority.as_ref(), &reg.territory);
    let record = flow
        .edit(&mut reg.store, id, &patch)
        .context(RegistrySnafu {})?;
    reg.store.save()?;
    to_json(&record)
}

pub fn run_list(reg: &Registry, filter: &RecordFilter, incidents: bool) -> CanvassResult<JSValue> {
    if incidents {
        return to_json(&reg.store.incidents());
    }
    let records = reg.store.list(filter).context(RegistrySnafu {})?;
    info!("{} records match {:?}", records.len(), filter);
    to_json(&records)
}

fn read_rows(input: &str, input_type: Option<&str>, worksheet: Option<&str>) -> CanvassResult<Vec<RawRow>> {
    let guessed = if input.to_lowercase().ends_with(".csv") {
        "csv"
    } else {
        "xlsx"
    };
    match input_type.unwrap_or(guessed) {
        "xlsx" => io_xlsx::read_xlsx_rows(input, worksheet),
        "csv" => io_csv::read_csv_rows(input),
        x => whatever!("Input type not implemented {:?}", x),
    }
}

pub fn read_summary(path: &str) -> CanvassResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let js: JSValue = serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

pub struct ImportRequest<'a> {
    pub input: &'a str,
    pub leader_id: u64,
    pub input_type: Option<&'a str>,
    pub worksheet: Option<&'a str>,
    pub out: Option<&'a str>,
    pub reference: Option<&'a str>,
}

pub fn run_import(reg: &mut Registry, req: &ImportRequest) -> CanvassResult<ImportSummary> {
    let rows = read_rows(req.input, req.input_type, req.worksheet)?;
    let file_name = simplify_file_name(req.input);
    let flow = make_flow(&reg.config, reg.authority.as_ref(), &reg.territory);
    let summary = import_rows(
        rows,
        req.leader_id,
        Some(file_name.as_str()),
        &flow,
        &mut reg.store,
    );
    reg.store.save()?;

    let result_js = to_json(&summary)?;
    let pretty_js = serde_json::to_string_pretty(&result_js).context(WritingJsonSnafu {})?;
    match req.out {
        None | Some("stdout") => println!("{}", pretty_js),
        Some(p) => {
            info!("Writing the import summary to {}", p);
            fs::write(p, &pretty_js).context(WritingFileSnafu { path: p })?;
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = req.reference {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_ref = serde_json::to_string_pretty(&summary_ref).context(WritingJsonSnafu {})?;
        if pretty_js_ref != pretty_js {
            warn!("Found differences with the reference summary");
            print_diff(pretty_js_ref.as_str(), pretty_js.as_str(), "\n");
            whatever!("Difference detected between the import summary and the reference summary")
        }
    }
    Ok(summary)
}

pub fn run(args: &Args) -> CanvassResult<()> {
    let config = match &args.config {
        Some(p) => read_config(p)?,
        None => LoadedConfig::in_current_dir(),
    };

    let output = match &args.command {
        Command::Territory {
            listing,
            department,
            municipality,
            station,
        } => run_territory(
            &config,
            listing.as_deref(),
            department.as_deref(),
            municipality.as_deref(),
            station.as_deref(),
        )?,
        Command::Verify { national_id, claim } => {
            let reg = Registry::open(config)?;
            run_verify(&reg, national_id, claim)?
        }
        Command::Register {
            name,
            national_id,
            age,
            gender,
            phone,
            address,
            leader_id,
            notes,
            registered_by,
            claim,
            verify,
        } => {
            let draft = VoterDraft {
                full_name: name.clone(),
                national_id: national_id.clone(),
                age: age.map(i64::from),
                gender: gender.as_deref().map(parse_gender).transpose()?.flatten(),
                phone: phone.clone(),
                residence_address: address.clone(),
                leader_id: *leader_id,
                location: claim_from_args(claim),
                notes: notes.clone(),
                registered_by: registered_by.clone(),
            };
            let mut reg = Registry::open(config)?;
            run_register(&mut reg, &draft, *verify)?
        }
        Command::Reverify { id } => {
            let mut reg = Registry::open(config)?;
            run_reverify(&mut reg, *id)?
        }
        Command::Edit {
            id,
            name,
            national_id,
            gender,
            phone,
            address,
            notes,
            state,
            claim,
        } => {
            let patch = RecordPatch {
                full_name: name.clone(),
                national_id: national_id.clone(),
                gender: gender.as_deref().map(parse_gender).transpose()?,
                phone: phone.as_ref().map(|p| Some(p.clone())),
                residence_address: address.clone(),
                state: state.as_deref().map(parse_state).transpose()?,
                notes: notes.as_ref().map(|n| Some(n.clone())),
                ..RecordPatch::default()
            };
            let mut reg = Registry::open(config)?;
            run_edit(&mut reg, *id, patch, claim)?
        }
        Command::List {
            state,
            municipality,
            leader_id,
            incidents,
        } => {
            let filter = RecordFilter {
                state: state.as_deref().map(parse_state).transpose()?,
                municipality: municipality.clone(),
                leader_id: *leader_id,
            };
            let reg = Registry::open(config)?;
            run_list(&reg, &filter, *incidents)?
        }
        Command::Import {
            input,
            leader_id,
            input_type,
            excel_worksheet_name,
            out,
            reference,
        } => {
            let req = ImportRequest {
                input,
                leader_id: *leader_id,
                input_type: input_type.as_deref(),
                worksheet: excel_worksheet_name.as_deref(),
                out: out.as_deref(),
                reference: reference.as_deref(),
            };
            let mut reg = Registry::open(config)?;
            run_import(&mut reg, &req)?;
            return Ok(());
        }
    };
    let pretty = serde_json::to_string_pretty(&output).context(WritingJsonSnafu {})?;
    println!("{}", pretty);
    Ok(())
}
