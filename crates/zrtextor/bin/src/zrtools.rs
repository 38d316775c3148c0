use clap::Parser;

fn main() {
    if let Err(err) = Cli::parse().run() {
        if !err.is_empty() {
            eprintln!("{err}");
        }
        std::process::exit(1);
    }
}

/// Tools for TeX font metric property lists, virtual fonts and their
/// composite ZVP form.
#[derive(Debug, clap::Parser)]
#[command(
    name = "zrtools",
    author = "The zrtextor project",
    version = "0.1",
    about,
    long_about,
    max_term_width(100)
)]
struct Cli {
    /// Downgrade structural problems (unknown properties, undecodable
    /// DVI programs, width mismatches) from errors to drops and hex
    /// fallbacks.
    #[arg(long)]
    lax: bool,

    /// Emit the octal-or-hex integer alias as hexadecimal.
    #[arg(long)]
    hex: bool,

    /// External Japanese encoding of property list files.
    #[arg(long, default_value = "utf8")]
    kanji: Encoding,

    /// Internal code space.
    #[arg(long, default_value = "unicode")]
    internal: InternalEncoding,

    /// Minimum span for a run of character codes to be written as a
    /// CTRANGE.
    #[arg(long, default_value_t = 8)]
    rangify_threshold: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Encoding {
    Jis,
    Euc,
    Sjis,
    Utf8,
    Xjis,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum InternalEncoding {
    Jis,
    Unicode,
}

#[derive(Clone, Debug, clap::Subcommand)]
enum Command {
    /// Parse a property list file and print it back, normalized.
    Fmt {
        /// Path to the property list file.
        path: std::path::PathBuf,
        /// Output path; standard out when omitted.
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
        /// Sort the top-level properties into canonical order first.
        #[arg(long)]
        rearrange: bool,
    },
    /// Convert a virtual font file to its ZPL text form.
    Vftozpl {
        /// Path to the .vf file.
        vf_path: std::path::PathBuf,
        /// Output path; standard out when omitted.
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },
    /// Convert a ZPL text file to a virtual font file.
    Zpltovf {
        /// Path to the ZPL file.
        zpl_path: std::path::PathBuf,
        /// Output path for the .vf file.
        vf_path: std::path::PathBuf,
    },
    /// Split a composite ZVP file into its VF-side and JFM-side
    /// property lists.
    Divide {
        /// Path to the ZVP file.
        zvp_path: std::path::PathBuf,
        /// Output path for the VF-side property list.
        #[arg(long)]
        vpl: std::path::PathBuf,
        /// Output path for the JFM-side property list.
        #[arg(long)]
        jpl: std::path::PathBuf,
    },
    /// Reassemble a composite ZVP file from its two halves.
    Compose {
        /// Path to the VF-side property list.
        vpl_path: std::path::PathBuf,
        /// Path to the JFM-side property list.
        jpl_path: std::path::PathBuf,
        /// Output path; standard out when omitted.
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },
    /// Rebalance per-character metrics into TYPE/CHARSINTYPE classes.
    Rebalance {
        /// Path to the property list file carrying CHARACTER metrics.
        path: std::path::PathBuf,
        /// Width errors stay within the height/depth bound divided by
        /// this ratio.
        #[arg(long, default_value_t = 20.0)]
        balance: f64,
        /// Output path; standard out when omitted.
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },
}

impl Cli {
    fn config(&self) -> zrtextor::Config {
        zrtextor::Config {
            vf_strict: !self.lax,
            prefer_hex: self.hex,
            rangify_threshold: self.rangify_threshold,
            external_enc: match self.kanji {
                Encoding::Jis => zrtextor::jcode::External::Jis,
                Encoding::Euc => zrtextor::jcode::External::EucJp,
                Encoding::Sjis => zrtextor::jcode::External::ShiftJis,
                Encoding::Utf8 => zrtextor::jcode::External::Utf8,
                Encoding::Xjis => zrtextor::jcode::External::XJis,
            },
            internal_enc: match self.internal {
                InternalEncoding::Jis => zrtextor::jcode::Internal::Jis0208,
                InternalEncoding::Unicode => zrtextor::jcode::Internal::Unicode,
            },
            ..Default::default()
        }
    }

    fn run(self) -> Result<(), String> {
        let cfg = self.config();
        match &self.command {
            Command::Fmt {
                path,
                output,
                rearrange,
            } => {
                let mut file = parse_pl_file(path, &cfg)?;
                if *rearrange {
                    zrtextor::pl::rearrange(&mut file);
                }
                let text = zrtextor::pl::emit(&file, 0, &cfg).map_err(|e| e.to_string())?;
                write_output(output.as_deref(), &text)
            }
            Command::Vftozpl { vf_path, output } => {
                let bytes = read_file(vf_path)?;
                let tree =
                    zrtextor::vf::deserialize(&bytes, &cfg).map_err(|e| e.to_string())?;
                let text = zrtextor::pl::emit(&tree, 0, &cfg).map_err(|e| e.to_string())?;
                write_output(output.as_deref(), &text)
            }
            Command::Zpltovf { zpl_path, vf_path } => {
                let tree = parse_pl_file(zpl_path, &cfg)?;
                let bytes =
                    zrtextor::vf::serialize(&tree, &cfg).map_err(|e| e.to_string())?;
                write_output(Some(vf_path), &bytes)
            }
            Command::Divide { zvp_path, vpl, jpl } => {
                let tree = parse_pl_file(zvp_path, &cfg)?;
                let divided = zrtextor::zvp::divide(&tree, &cfg).map_err(|e| e.to_string())?;
                let vf_text =
                    zrtextor::pl::emit(&divided.vf, 0, &cfg).map_err(|e| e.to_string())?;
                let jfm_text =
                    zrtextor::pl::emit(&divided.jfm, 0, &cfg).map_err(|e| e.to_string())?;
                write_output(Some(vpl), &vf_text)?;
                write_output(Some(jpl), &jfm_text)
            }
            Command::Compose {
                vpl_path,
                jpl_path,
                output,
            } => {
                let vf = parse_pl_file(vpl_path, &cfg)?;
                let jfm = parse_pl_file(jpl_path, &cfg)?;
                let composed =
                    zrtextor::zvp::compose(&vf, &jfm, &cfg).map_err(|e| e.to_string())?;
                let text =
                    zrtextor::pl::emit(&composed, 0, &cfg).map_err(|e| e.to_string())?;
                write_output(output.as_deref(), &text)
            }
            Command::Rebalance {
                path,
                balance,
                output,
            } => {
                let mut file = parse_pl_file(path, &cfg)?;
                let rmt = zrtextor::jfm::raw_metric_from_pl(&file);
                if rmt.is_empty() {
                    return Err(format!(
                        "`{}` carries no CHARACTER metrics to rebalance",
                        path.display()
                    ));
                }
                let (_, reduced) =
                    zrtextor::jfm::reduce_jpl_x(&rmt, *balance).map_err(|e| e.to_string())?;
                file.0.retain(|l| l.head() != Some("CHARACTER"));
                for list in zrtextor::jfm::reduced_to_lists(&reduced, &cfg) {
                    file.push(list);
                }
                zrtextor::pl::rearrange(&mut file);
                let text = zrtextor::pl::emit(&file, 0, &cfg).map_err(|e| e.to_string())?;
                write_output(output.as_deref(), &text)
            }
        }
    }
}

fn read_file(path: &std::path::Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|err| format!("Failed to read `{}`: {}", path.display(), err))
}

fn parse_pl_file(
    path: &std::path::Path,
    cfg: &zrtextor::Config,
) -> Result<zrtextor::pl::PlFile, String> {
    let bytes = read_file(path)?;
    zrtextor::pl::parse(&bytes, cfg)
        .map_err(|err| format!("`{}`: {}", path.display(), err))
}

fn write_output(path: Option<&std::path::Path>, bytes: &[u8]) -> Result<(), String> {
    match path {
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(bytes)
                .map_err(|err| format!("Failed to write standard out: {err}"))
        }
        Some(path) => std::fs::write(path, bytes)
            .map_err(|err| format!("Failed to write `{}`: {}", path.display(), err)),
    }
}
