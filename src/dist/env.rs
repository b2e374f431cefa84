use std::{env, str::FromStr};

use super::DistErr;

pub const RANK: &str = "RANK";
pub const LOCAL_RANK: &str = "LOCAL_RANK";
pub const WORLD_SIZE: &str = "WORLD_SIZE";
pub const MASTER_ADDR: &str = "MASTER_ADDR";
pub const MASTER_PORT: &str = "MASTER_PORT";

/// The variables a distributed launcher sets for every process, in lookup order.
pub const LAUNCHER_VARS: [&str; 5] = [RANK, LOCAL_RANK, WORLD_SIZE, MASTER_ADDR, MASTER_PORT];

/// Process topology handed over by a distributed launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistEnv {
    pub rank: usize,
    pub local_rank: usize,
    pub world_size: usize,
    pub master_addr: String,
    pub master_port: u16,
}

impl DistEnv {
    /// Reads the topology from the process environment.
    ///
    /// # Errors
    /// See `from_lookup`.
    pub fn from_env() -> Result<Self, DistErr> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Reads the topology through `lookup`.
    ///
    /// Variables are read and parsed one at a time in `LAUNCHER_VARS` order, so the
    /// first failing variable is the one reported.
    ///
    /// # Errors
    /// * `DistErr::MissingEnv` naming the first absent variable.
    /// * `DistErr::InvalidEnv` if a numeric variable doesn't parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DistErr>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rank = parse(&lookup, RANK)?;
        let local_rank = parse(&lookup, LOCAL_RANK)?;
        let world_size = parse(&lookup, WORLD_SIZE)?;
        let master_addr = require(&lookup, MASTER_ADDR)?;
        let master_port = parse(&lookup, MASTER_PORT)?;

        Ok(Self {
            rank,
            local_rank,
            world_size,
            master_addr,
            master_port,
        })
    }

    /// The rendezvous endpoint, `tcp://[{master_addr}]:{master_port}`.
    ///
    /// Brackets keep IPv6 literals unambiguous.
    pub fn init_method(&self) -> String {
        format!("tcp://[{}]:{}", self.master_addr, self.master_port)
    }
}

fn require<F>(lookup: &F, var: &'static str) -> Result<String, DistErr>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var).ok_or(DistErr::MissingEnv { var })
}

fn parse<F, T>(lookup: &F, var: &'static str) -> Result<T, DistErr>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr<Err = std::num::ParseIntError>,
{
    let value = require(lookup, var)?;
    value
        .trim()
        .parse()
        .map_err(|source| DistErr::InvalidEnv { var, value, source })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn launcher_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (RANK, "3".to_string()),
            (LOCAL_RANK, "1".to_string()),
            (WORLD_SIZE, "8".to_string()),
            (MASTER_ADDR, "10.0.0.7".to_string()),
            (MASTER_PORT, "29500".to_string()),
        ])
    }

    fn read(vars: &HashMap<&'static str, String>) -> Result<DistEnv, DistErr> {
        DistEnv::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn complete_environment_builds_endpoint() {
        let env = read(&launcher_env()).unwrap();

        assert_eq!(env.rank, 3);
        assert_eq!(env.local_rank, 1);
        assert_eq!(env.world_size, 8);
        assert_eq!(env.init_method(), "tcp://[10.0.0.7]:29500");
    }

    #[test]
    fn ipv6_master_is_bracketed() {
        let mut vars = launcher_env();
        vars.insert(MASTER_ADDR, "fe80::1".to_string());
        assert_eq!(read(&vars).unwrap().init_method(), "tcp://[fe80::1]:29500");
    }

    #[test]
    fn each_missing_variable_is_named() {
        for var in LAUNCHER_VARS {
            let mut vars = launcher_env();
            vars.remove(var);

            match read(&vars) {
                Err(DistErr::MissingEnv { var: missing }) => assert_eq!(missing, var),
                other => panic!("expected MissingEnv for {var}, got {other:?}"),
            }
        }
    }

    #[test]
    fn first_missing_variable_wins() {
        let mut vars = launcher_env();
        vars.remove(WORLD_SIZE);
        vars.remove(MASTER_PORT);

        assert!(matches!(
            read(&vars),
            Err(DistErr::MissingEnv { var: WORLD_SIZE })
        ));
    }

    #[test]
    fn unparsable_port_is_invalid_not_missing() {
        let mut vars = launcher_env();
        vars.insert(MASTER_PORT, "70000".to_string());

        let err = read(&vars).unwrap_err();
        assert!(matches!(err, DistErr::InvalidEnv { var: MASTER_PORT, .. }));
        assert!(err.to_string().contains("70000"));
    }
}
