use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "apiprobe",
    version,
    about = "API-discovery and mutation-testing harness",
    long_about = "Apiprobe probes a target host's candidate API endpoints with structurally \
mutated request bodies and records anything interesting the responses give away.\n\n\
Examples:\n  apiprobe -u http://target.tld:3000\n  apiprobe -u http://target.tld:3000 -p http://127.0.0.1:8080 --reps 10\n  apiprobe -u http://target.tld:3000 --config ~/.apiprobe/config.yml\n\n\
Tip: Use --config to persist probe settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "vb",
        visible_alias = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase verbosity (-v, -vv, -vvv)."
    )]
    pub verbose: u8,

    #[arg(
        short = 'u',
        long = "u",
        visible_alias = "url",
        value_name = "URL",
        help_heading = "Input",
        help = "Base URL of the target host."
    )]
    pub url: Option<String>,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.apiprobe/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'p',
        long = "px",
        visible_alias = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "Egress proxy handed in by an external proxy service (direct when absent)."
    )]
    pub proxy: Option<String>,

    #[arg(
        long = "timeout",
        value_name = "SECONDS",
        help_heading = "HTTP",
        help = "Per-request timeout in seconds."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'r',
        long = "rc",
        visible_alias = "retries",
        value_name = "N",
        help_heading = "HTTP",
        help = "Transport retry attempts per request."
    )]
    pub retries: Option<u32>,

    #[arg(
        long = "aw",
        visible_alias = "activation-workers",
        value_name = "N",
        help_heading = "Performance",
        help = "Worker count for the activation-endpoint pool."
    )]
    pub activation_workers: Option<usize>,

    #[arg(
        long = "gw",
        visible_alias = "generic-workers",
        value_name = "N",
        help_heading = "Performance",
        help = "Worker count for the generic-endpoint pool."
    )]
    pub generic_workers: Option<usize>,

    #[arg(
        long = "reps",
        visible_alias = "pattern-repetitions",
        value_name = "N",
        help_heading = "Performance",
        help = "Probes per code-format pattern on each activation endpoint."
    )]
    pub pattern_repetitions: Option<u32>,

    #[arg(
        long = "rd",
        visible_alias = "repetition-delay",
        value_name = "MS",
        help_heading = "Performance",
        help = "Delay between pattern repetitions in milliseconds."
    )]
    pub repetition_delay_ms: Option<u64>,

    #[arg(
        long = "sr",
        visible_alias = "submission-rate",
        value_name = "RPS",
        help_heading = "Performance",
        help = "Generic-endpoint submissions per second."
    )]
    pub submission_rate: Option<u32>,

    #[arg(
        long = "il",
        visible_alias = "interesting-log",
        value_name = "FILE",
        help_heading = "Output",
        help = "Interesting-responses artifact path."
    )]
    pub interesting_log: Option<String>,

    #[arg(
        long = "al",
        visible_alias = "activations-log",
        value_name = "FILE",
        help_heading = "Output",
        help = "Successful-activations artifact path."
    )]
    pub activations_log: Option<String>,

    #[arg(
        long = "sl",
        visible_alias = "structures-log",
        value_name = "FILE",
        help_heading = "Output",
        help = "API-structure-samples artifact path."
    )]
    pub structures_log: Option<String>,
}
