//! Network masks as written in account and block-list settings.
//!
//! A mask is a list of rules separated by `,` or `|`. A rule is an address,
//! a CIDR network, or a wildcard pattern (`192.168.*`, `10.0.0.?`). A leading
//! `!` negates the whole mask.

use ipnetwork::IpNetwork;
use regex::Regex;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid network mask rule: {0}")]
pub struct MaskError(String);

#[derive(Debug, Clone)]
enum Rule {
    Address(IpAddr),
    Network(IpNetwork),
    Pattern(Regex),
}

impl Rule {
    fn matches(&self, ip: IpAddr) -> bool {
        match self {
            Self::Address(address) => *address == ip,
            Self::Network(network) => network.contains(ip),
            Self::Pattern(pattern) => pattern.is_match(&ip.to_string()),
        }
    }
}

impl FromStr for Rule {
    type Err = MaskError;

    fn from_str(rule: &str) -> Result<Self, Self::Err> {
        if let Ok(address) = rule.parse::<IpAddr>() {
            return Ok(Self::Address(address));
        }
        if rule.contains('/') {
            return rule
                .parse::<IpNetwork>()
                .map(Self::Network)
                .map_err(|_| MaskError(rule.to_string()));
        }
        if rule
            .chars()
            .all(|c| c.is_ascii_hexdigit() || matches!(c, '.' | ':' | '*' | '?'))
        {
            let pattern = regex::escape(rule)
                .replace(r"\*", ".*")
                .replace(r"\?", ".");
            return Regex::new(&format!("(?i)^{pattern}$"))
                .map(Self::Pattern)
                .map_err(|_| MaskError(rule.to_string()));
        }
        Err(MaskError(rule.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct NetMask {
    negate: bool,
    rules: Vec<Rule>,
}

impl NetMask {
    #[must_use]
    pub fn matches(&self, ip: IpAddr) -> bool {
        self.rules.iter().any(|rule| rule.matches(ip)) != self.negate
    }
}

impl FromStr for NetMask {
    type Err = MaskError;

    fn from_str(mask: &str) -> Result<Self, Self::Err> {
        let trimmed = mask.trim();
        let (negate, body) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let rules = body
            .split([',', '|'])
            .map(str::trim)
            .filter(|rule| !rule.is_empty())
            .map(Rule::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { negate, rules })
    }
}

/// Whether `ip` satisfies `mask`. Unparsable masks match nothing.
#[must_use]
pub fn net_matches(ip: IpAddr, mask: &str) -> bool {
    mask.parse::<NetMask>().is_ok_and(|mask| mask.matches(ip))
}
