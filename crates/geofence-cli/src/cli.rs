use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "geofence",
    about = "Multi-tenant geofence automation pipeline: ingest, processor, delivery",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the fix-ingest subscriber (C1), feeding the embedded processor and
    /// rule matcher in-process — the internal sharded-channel transport (§4.2)
    /// has no external fix bus to hand off to yet.
    Ingest,

    /// Run the transition processor (C3) and rule matcher (C5). Provided for
    /// operational symmetry with `ingest`; today it wires the identical
    /// in-process pipeline since C2 has no external transport to consume from
    /// independently (see `ingest`).
    Processor,

    /// Run only the webhook worker pool (C7), polling the durable delivery
    /// queue in the store. Genuinely independent of the other stages — safe
    /// to run as several horizontally-scaled processes against one Postgres.
    Delivery,

    /// Run ingest, processor, rule matcher and delivery worker pool together
    /// in one process. The recommended way to run this pipeline locally.
    AllInOne,

    /// Operational DLQ commands.
    Dlq {
        #[command(subcommand)]
        command: DlqCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum DlqCommand {
    /// List DLQ entries, most recent first.
    List {
        /// Filter by origin: "ingest" or "delivery".
        #[arg(long)]
        origin: Option<String>,

        #[arg(long, default_value_t = 100)]
        limit: u32,
    },

    /// Re-enqueue a `delivery`-origin DLQ entry as a fresh Delivery.
    Replay {
        /// The DLQEntry ID to replay.
        id: String,
    },
}
