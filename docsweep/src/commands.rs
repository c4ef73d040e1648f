use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

fn mode_arg() -> clap::Arg {
    arg!(-m --"mode" <MODE>)
        .required(false)
        .help("Extraction mode: 0 = CSV only, 1 = content, 2 = TOC, 3 = content + TOC")
        .value_parser(clap::value_parser!(u8).range(0..=3))
}

fn config_arg() -> clap::Arg {
    arg!(-c --"config" <PATH>)
        .required(false)
        .help("Path to config.json (defaults apply to every missing key)")
        .value_parser(clap::value_parser!(std::path::PathBuf))
}

fn headers_arg() -> clap::Arg {
    arg!(--"headers" <PATH>)
        .required(false)
        .help("Path to headers.json, a flat object of header name to value")
        .value_parser(clap::value_parser!(std::path::PathBuf))
}

fn output_arg() -> clap::Arg {
    arg!(-o --"output-dir" <DIR>)
        .required(false)
        .help("Directory documents are written under (overrides output_dir)")
        .value_parser(clap::value_parser!(std::path::PathBuf))
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("docsweep")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("docsweep")
        .about("Crawl a documentation site into clean Markdown and tables of contents")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress non-essential output").required(false).global(true))
        .arg(
            arg!(-v --"verbose" ... "Raise log verbosity (-v info, -vv debug)")
                .required(false)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            command!("scan")
                .about(
                    "Recursively crawl one or more documentation sites, writing Markdown \
                content, tables of contents and a CSV record of every URL.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("The URL to start from")
                        .value_parser(clap::value_parser!(Url))
                        .conflicts_with("hosts-file"),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of start URLs")
                        .value_parser(clap::value_parser!(std::path::PathBuf))
                        .conflicts_with("url"),
                )
                .arg(config_arg())
                .arg(headers_arg())
                .arg(mode_arg())
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of async workers in the pool (overrides max_workers)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(-d --"depth" <DEPTH>)
                        .required(false)
                        .help("Maximum link depth from the start URLs (overrides max_depth)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(output_arg())
                .arg(
                    arg!(--"no-inline")
                        .required(false)
                        .help("Re-fetch pages for extraction instead of reusing the crawled body")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"report" <PATH>)
                        .required(false)
                        .help("Save the run report to a file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("extract")
                .about("Fetch a single page once and write its content and TOC documents")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The page to extract")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(config_arg())
                .arg(headers_arg())
                .arg(mode_arg())
                .arg(output_arg()),
        )
        .subcommand(
            command!("presets")
                .about("List the built-in documentation framework presets")
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Print the presets as JSON")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_tree_is_valid() {
        command_argument_builder().debug_assert();
    }

    #[test]
    fn test_scan_arguments() {
        let matches = command_argument_builder()
            .try_get_matches_from([
                "docsweep",
                "-vv",
                "scan",
                "-u",
                "https://docs.example.com",
                "-m",
                "2",
                "-t",
                "4",
                "--no-inline",
            ])
            .unwrap();
        assert_eq!(matches.get_count("verbose"), 2);

        let (name, scan) = matches.subcommand().unwrap();
        assert_eq!(name, "scan");
        assert_eq!(scan.get_one::<u8>("mode"), Some(&2));
        assert_eq!(scan.get_one::<usize>("threads"), Some(&4));
        assert!(scan.get_flag("no-inline"));
        assert_eq!(scan.get_one::<String>("format").map(String::as_str), Some("text"));
    }

    #[test]
    fn test_mode_out_of_range_is_rejected() {
        let result = command_argument_builder().try_get_matches_from([
            "docsweep",
            "extract",
            "-u",
            "https://docs.example.com",
            "-m",
            "7",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_url_and_hosts_file_conflict() {
        let result = command_argument_builder().try_get_matches_from([
            "docsweep",
            "scan",
            "-u",
            "https://docs.example.com",
            "-H",
            "hosts.txt",
        ]);
        assert!(result.is_err());
    }
}
