use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "il", about = concat!("instalog v", env!("CARGO_PKG_VERSION"), " - log it now, sort it later"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Use a different data directory
    #[arg(long = "data-dir", global = true, value_name = "DIR")]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture a log (checks the free-tier cap first)
    Log(LogArgs),
    /// List logs
    List(ListArgs),
    /// Sort a log into a bucket, archive it, or return it to unsorted
    Assign(AssignArgs),
    /// Permanently delete a log
    Delete(DeleteArgs),
    /// Reconcile with the widget's shared container
    Sync,
    /// Show tier, usage and prompt state
    Quota,
    /// Record the purchase outcome
    Entitle(EntitleArgs),
    /// Mark a prompt as seen
    Seen(SeenArgs),
    /// Bucket management
    Bucket(BucketCmd),
    /// Widget preset management
    Preset(PresetCmd),
    /// Show logs per day
    Stats,
    /// Erase logs, buckets and presets in both stores
    Wipe(WipeArgs),
    /// Run as the widget extension
    Widget(WidgetCmd),
    /// View the recovery log
    Recovery(RecoveryArgs),
}

// ---------------------------------------------------------------------------
// Log commands
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct LogArgs {
    /// Optional note for the log
    pub text: Option<String>,
}

#[derive(Args)]
#[group(multiple = false)]
pub struct ListArgs {
    /// Only logs that still need sorting
    #[arg(long)]
    pub unsorted: bool,
    /// Only logs captured today
    #[arg(long)]
    pub today: bool,
    /// Only logs captured on this day (YYYY-MM-DD)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<String>,
}

#[derive(Args)]
pub struct AssignArgs {
    /// Log ID
    pub id: String,
    /// Target bucket ID
    #[arg(required_unless_present_any = ["archive", "unsort"], conflicts_with_all = ["archive", "unsort"])]
    pub bucket_id: Option<String>,
    /// Archive the log
    #[arg(long, conflicts_with = "unsort")]
    pub archive: bool,
    /// Return the log to unsorted
    #[arg(long)]
    pub unsort: bool,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Log ID
    pub id: String,
}

// ---------------------------------------------------------------------------
// Entitlement
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct EntitleArgs {
    /// Whether the user is entitled to pro
    #[arg(action = clap::ArgAction::Set)]
    pub entitled: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PromptArg {
    SoftPrompt,
    Badge,
    Paywall,
}

#[derive(Args)]
pub struct SeenArgs {
    /// Which prompt was shown
    #[arg(value_enum)]
    pub prompt: PromptArg,
}

// ---------------------------------------------------------------------------
// Buckets and presets
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct BucketCmd {
    #[command(subcommand)]
    pub action: Option<BucketAction>,
}

#[derive(Subcommand)]
pub enum BucketAction {
    /// List buckets (default)
    List,
    /// Create a bucket
    Add(BucketAddArgs),
    /// Rename a bucket
    Rename(BucketRenameArgs),
    /// Remove a bucket (its logs keep the reference)
    Rm(IdArg),
}

#[derive(Args)]
pub struct BucketAddArgs {
    /// Display name
    pub name: String,
}

#[derive(Args)]
pub struct BucketRenameArgs {
    /// Bucket ID
    pub id: String,
    /// New display name
    pub name: String,
}

#[derive(Args)]
pub struct IdArg {
    /// ID
    pub id: String,
}

#[derive(Args)]
pub struct PresetCmd {
    #[command(subcommand)]
    pub action: Option<PresetAction>,
}

#[derive(Subcommand)]
pub enum PresetAction {
    /// List presets (default)
    List,
    /// Create a preset and publish it to the widget
    Add(PresetAddArgs),
    /// Remove a preset
    Rm(IdArg),
}

#[derive(Args)]
pub struct PresetAddArgs {
    /// Button label
    pub label: String,
    /// Text captured when the preset is tapped
    pub text: String,
    /// Icon name
    #[arg(long)]
    pub icon: Option<String>,
    /// Bucket id to associate with the preset
    #[arg(long = "bucket")]
    pub bucket_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct WipeArgs {
    /// Confirm erasing everything
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct RecoveryArgs {
    /// Maximum number of entries to show (default: 10)
    #[arg(long)]
    pub limit: Option<usize>,
    /// Print the absolute path to the recovery log
    #[arg(long)]
    pub path: bool,
    /// Only the widget's log in the shared container
    #[arg(long)]
    pub widget: bool,
}

// ---------------------------------------------------------------------------
// Widget extension
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct WidgetCmd {
    #[command(subcommand)]
    pub action: WidgetAction,
}

#[derive(Subcommand)]
pub enum WidgetAction {
    /// Capture from the widget
    Log(LogArgs),
    /// Capture a preset's text
    Preset(IdArg),
    /// Show today's count as the widget sees it
    Count,
}
