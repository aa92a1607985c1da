// actiontag - a parser for action tags in form field annotations.
// Copyright (C) 2025 The actiontag authors.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <http://www.gnu.org/licenses/>.

use std::{
    fs::File,
    io::Read,
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use actiontag::{
    parse,
    registry::{TAG_INFO, tag_info},
    tags::{FieldSource, ResolveContext, TagCollector, TagFilter},
};

/// Inspect action tags in form field annotation text.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    Parse(Parse),
    Collect(Collect),
    Registry(Registry),
}

impl Command {
    fn run(self) -> Result<()> {
        match self {
            Command::Parse(parse) => parse.run(),
            Command::Collect(collect) => collect.run(),
            Command::Registry(registry) => registry.run(),
        }
    }
}

/// Parse annotation text into segments, printed as JSON.
#[derive(Args, Clone, Debug)]
struct Parse {
    /// File to read, or standard input if omitted.
    file: Option<PathBuf>,

    /// Re-base all spans by this many codepoints.
    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Print only the top-level tag segments.
    #[arg(long)]
    tags_only: bool,

    /// Print compact JSON instead of pretty-printed.
    #[arg(long)]
    compact: bool,
}

impl Parse {
    fn run(self) -> Result<()> {
        let input = read_input(self.file.as_deref())?;
        if self.tags_only {
            print_json(&parse::parse_tags(&input), self.compact)
        } else {
            print_json(&parse::parse_at(&input, self.offset), self.compact)
        }
    }
}

/// Collect tags from a JSON object mapping field names to annotation text.
#[derive(Args, Clone, Debug)]
struct Collect {
    /// JSON file with the field-to-annotation mapping.
    fields: PathBuf,

    /// Only collect this tag (repeatable).
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Only collect from this field (repeatable).
    #[arg(long = "field")]
    fields_filter: Vec<String>,

    #[arg(long, default_value_t = 1)]
    project_id: u64,

    /// Group the output by field rather than by tag.
    #[arg(long)]
    by_field: bool,

    #[arg(long)]
    no_cache: bool,

    /// Print compact JSON instead of pretty-printed.
    #[arg(long)]
    compact: bool,
}

impl Collect {
    fn run(self) -> Result<()> {
        let file = File::open(&self.fields)
            .with_context(|| format!("cannot open {}", self.fields.display()))?;
        let source: FieldSource = serde_json::from_reader(file)
            .with_context(|| format!("cannot parse {}", self.fields.display()))?;
        let filter = (!self.tags.is_empty() || !self.fields_filter.is_empty()).then(|| TagFilter {
            tags: self.tags.clone(),
            fields: self.fields_filter.clone(),
        });
        let context = ResolveContext::new(self.project_id);
        let mut collector = TagCollector::new();
        if self.no_cache {
            collector.cache_mut().set_enabled(false);
        }
        if self.by_field {
            let map = collector.collect_by_field(&source, filter.as_ref(), &context)?;
            print_json(&map, self.compact)
        } else {
            let map = collector.collect(&source, filter.as_ref(), &context)?;
            print_json(&map, self.compact)
        }
    }
}

/// Show the static tag registry, or a single entry.
#[derive(Args, Clone, Debug)]
struct Registry {
    /// Tag name to look up (the leading `@` may be omitted).
    name: Option<String>,
}

impl Registry {
    fn run(self) -> Result<()> {
        match self.name {
            Some(name) => {
                let name = if name.starts_with('@') {
                    name
                } else {
                    format!("@{name}")
                };
                let info = tag_info(&name)
                    .with_context(|| format!("no registry entry for {name}"))?;
                print_json(info, false)
            }
            None => print_json(&TAG_INFO, false),
        }
    }
}

fn read_input(file: Option<&std::path::Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("cannot read standard input")?;
            Ok(input)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<()> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{json}");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    Cli::parse().command.run()
}
