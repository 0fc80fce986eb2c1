use clap::{Parser, ValueEnum};
use eyre::{Result, eyre};
use prettytable::{Cell, Row, Table};
use tagalloc::Mimalloc;
use tagalloc::diagnostics::{try_integer_control, try_option_control};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Int,
    Option,
}

#[derive(Debug, Parser)]
pub struct TunableArgs {
    #[arg(help = "Tunable name, e.g. max_warnings; omit to list all")]
    name: Option<String>,

    #[arg(long, help = "New value; integers for int tunables, true/false/1/0 for options")]
    set: Option<String>,

    #[arg(long, value_enum, default_value_t = Kind::Int)]
    kind: Kind,
}

impl TunableArgs {
    pub fn run(&self) -> Result<()> {
        let Some(name) = self.name.as_deref() else {
            list_tunables();
            return Ok(());
        };

        match self.kind {
            Kind::Int => {
                let new_value = self
                    .set
                    .as_deref()
                    .map(|raw| raw.trim().parse::<i64>())
                    .transpose()
                    .map_err(|e| eyre!("invalid integer for {}: {}", name, e))?;
                let previous = try_integer_control(name, new_value)?;
                print_change(name, previous, new_value);
            }
            Kind::Option => {
                let new_value = self.set.as_deref().map(parse_flag).transpose()?;
                let previous = try_option_control(name, new_value)?;
                print_change(name, previous, new_value);
            }
        }

        Ok(())
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(eyre!("invalid flag '{}', expected true or false", other)),
    }
}

fn print_change<V: std::fmt::Display>(name: &str, previous: V, new_value: Option<V>) {
    match new_value {
        Some(value) => println!("{}: {} -> {}", name, previous, value),
        None => println!("{}: {}", name, previous),
    }
}

fn list_tunables() {
    let mut table = Table::new();
    table.add_row(Row::new(vec![Cell::new("Tunable"), Cell::new("Value")]));
    for name in Mimalloc::tunable_names() {
        let value = match try_integer_control(name, None) {
            Ok(value) => value.to_string(),
            Err(e) => e.to_string(),
        };
        table.add_row(Row::new(vec![Cell::new(name), Cell::new(&value)]));
    }
    table.printstd();
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE").unwrap());
        assert!(!parse_flag(" 0 ").unwrap());
        assert!(parse_flag("maybe").is_err());
    }
}
