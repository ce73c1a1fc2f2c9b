use clap::{Parser, Subcommand};

/// Voter registry: territory lookups, registration, verification against the
/// voter registry authority and bulk imports.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON configuration file. It tells where the territory listing,
    /// the record store and the verification authority are. Without it, the records are kept
    /// in records.json in the current directory and no authority is configured.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

/// The location fields of a claim.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ClaimArgs {
    #[clap(long, value_parser)]
    pub department: Option<String>,
    #[clap(long, value_parser)]
    pub municipality: Option<String>,
    /// The polling station (puesto / lugar de votación).
    #[clap(long, value_parser)]
    pub voting_station: Option<String>,
    /// The polling table (mesa).
    #[clap(long, value_parser)]
    pub polling_table: Option<String>,
    /// The address of the polling station.
    #[clap(long, value_parser)]
    pub station_address: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Prints the next level of the territory cascade: the departments, or the municipalities
    /// of a department, or the stations of a municipality, or the addresses of a station.
    Territory {
        /// (file path) The reference listing. Overrides territorySource in the configuration.
        #[clap(long, value_parser)]
        listing: Option<String>,
        #[clap(long, value_parser)]
        department: Option<String>,
        #[clap(long, value_parser)]
        municipality: Option<String>,
        #[clap(long, value_parser)]
        station: Option<String>,
    },
    /// Verifies a claim against the authority without saving anything.
    Verify {
        #[clap(long, value_parser)]
        national_id: String,
        #[clap(flatten)]
        claim: ClaimArgs,
    },
    /// Registers a new voter.
    Register {
        #[clap(long, value_parser)]
        name: String,
        #[clap(long, value_parser)]
        national_id: String,
        #[clap(long, value_parser)]
        age: Option<u32>,
        /// (M, F or Otro)
        #[clap(long, value_parser)]
        gender: Option<String>,
        #[clap(long, value_parser)]
        phone: Option<String>,
        /// The residence address.
        #[clap(long, value_parser)]
        address: Option<String>,
        #[clap(long, value_parser)]
        leader_id: Option<u64>,
        #[clap(long, value_parser)]
        notes: Option<String>,
        /// Who captured the record.
        #[clap(long, value_parser)]
        registered_by: Option<String>,
        #[clap(flatten)]
        claim: ClaimArgs,
        /// Verify against the authority before saving. Otherwise the record is saved unverified.
        #[clap(long, takes_value = false)]
        verify: bool,
    },
    /// Verifies a stored record again.
    Reverify {
        #[clap(long, value_parser)]
        id: u64,
    },
    /// Edits a stored record. Changing the location of a record in revision or inconsistent
    /// verifies it again.
    Edit {
        #[clap(long, value_parser)]
        id: u64,
        #[clap(long, value_parser)]
        name: Option<String>,
        #[clap(long, value_parser)]
        national_id: Option<String>,
        /// (M, F or Otro) An empty value removes it.
        #[clap(long, value_parser)]
        gender: Option<String>,
        /// The new phone. An empty value or "NO TIENE" removes it.
        #[clap(long, value_parser)]
        phone: Option<String>,
        #[clap(long, value_parser)]
        address: Option<String>,
        #[clap(long, value_parser)]
        notes: Option<String>,
        /// (unverified, verified, revision or inconsistent) Sets the state by hand.
        #[clap(long, value_parser)]
        state: Option<String>,
        #[clap(flatten)]
        claim: ClaimArgs,
    },
    /// Lists the stored records.
    List {
        /// (unverified, verified, revision or inconsistent)
        #[clap(long, value_parser)]
        state: Option<String>,
        #[clap(long, value_parser)]
        municipality: Option<String>,
        #[clap(long, value_parser)]
        leader_id: Option<u64>,
        /// Prints the recorded import incidents instead of the records.
        #[clap(long, takes_value = false)]
        incidents: bool,
    },
    /// Imports voters from a spreadsheet for one leader.
    Import {
        /// (file path) The spreadsheet or CSV file to import.
        #[clap(short, long, value_parser)]
        input: String,

        /// The leader the imported voters are attached to.
        #[clap(long, value_parser)]
        leader_id: u64,

        /// (default xlsx, or csv) The type of the input. When not provided, it is guessed
        /// from the file extension.
        #[clap(long, value_parser)]
        input_type: Option<String>,

        /// When using an Excel file, indicates the name of the worksheet to use. By default, the
        /// first worksheet is read.
        #[clap(long, value_parser)]
        excel_worksheet_name: Option<String>,

        /// (file path or 'stdout') Where the summary of the import is written in JSON format.
        /// Defaults to the standard output.
        #[clap(short, long, value_parser)]
        out: Option<String>,

        /// (file path) A reference file containing an import summary in JSON format. If provided,
        /// canvass checks that the summary of this import matches the reference.
        #[clap(short, long, value_parser)]
        reference: Option<String>,
    },
}
