// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Command Grammar
//!
//! Script lines are `<verb> <args...>`. [`Command::parse`] maps a line to the
//! closed [`Command`] enumeration with typed arguments, failing fast on
//! unknown verbs and malformed arguments. JSON arguments take the rest of the
//! line, so they may contain spaces.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

use crate::domain::conformance::{CheckName, UnknownCheck};
use crate::domain::identity::{Algorithm, IdentityKind};
use crate::domain::jsonrpc::RpcId;
use crate::domain::transaction::TransactionTarget;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: '{0}'")]
    UnknownCommand(String),

    #[error("{command}: missing argument <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("{command}: invalid argument <{argument}>: {reason}")]
    InvalidArgument {
        command: &'static str,
        argument: &'static str,
        reason: String,
    },
}

/// Validity window of a self-issued credential fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialValidity {
    Valid,
    Expired,
    NotYetValid,
    Revoked,
}

impl FromStr for CredentialValidity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(CredentialValidity::Valid),
            "expired" => Ok(CredentialValidity::Expired),
            "not-yet-valid" => Ok(CredentialValidity::NotYetValid),
            "revoked" => Ok(CredentialValidity::Revoked),
            other => Err(format!(
                "'{}' (expected valid, expired, not-yet-valid or revoked)",
                other
            )),
        }
    }
}

/// JSON-RPC endpoints reachable with the raw `jsonrpc` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcService {
    Timestamp,
    Registry,
    Ledger,
}

impl FromStr for RpcService {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timestamp" => Ok(RpcService::Timestamp),
            "tar" => Ok(RpcService::Registry),
            "ledger" => Ok(RpcService::Ledger),
            other => Err(format!("'{}' (expected timestamp, tar or ledger)", other)),
        }
    }
}

/// Assertion on the previous command's failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Exact HTTP status code.
    Status(u16),
    /// Case-insensitive phrase in the error message or kind.
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ClearIdentity,
    UseIdentity {
        algorithms: Vec<Algorithm>,
        kind: IdentityKind,
        key: Option<String>,
        did: Option<String>,
    },
    Authenticate {
        algorithm: Algorithm,
    },
    Present {
        algorithm: Algorithm,
        credentials: Vec<String>,
    },
    IssueCredential {
        variable: String,
        validity: CredentialValidity,
        algorithm: Option<Algorithm>,
    },
    Transact {
        target: TransactionTarget,
        method: String,
        params: Option<Value>,
    },
    TimestampHashes {
        hashes: Vec<String>,
    },
    GetTimestamp {
        id: String,
    },
    JsonRpc {
        service: RpcService,
        id: RpcId,
        method: String,
        params: Vec<Value>,
    },
    ListApps,
    GetApp {
        name: String,
    },
    GetAuthorization {
        id: String,
    },
    SendNotification {
        to: String,
        payload: Value,
    },
    ListNotifications,
    StoreAttribute {
        payload: Value,
    },
    GetAttribute {
        id: String,
    },
    ListAttributes,
    SetVariable {
        name: String,
        value: String,
    },
    ViewVariable {
        name: String,
    },
    SetConformanceHeader {
        trace_id: Option<String>,
    },
    Check {
        name: CheckName,
    },
    Expect(Expectation),
    Reset,
}

/// First `n` whitespace-separated tokens and the trimmed remainder.
fn split_rest(line: &str, n: usize) -> (Vec<&str>, Option<&str>) {
    let mut tokens = Vec::new();
    let mut rest = line.trim_start();
    while tokens.len() < n && !rest.is_empty() {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        tokens.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    let rest = rest.trim_end();
    (tokens, if rest.is_empty() { None } else { Some(rest) })
}

struct Args<'a> {
    command: &'static str,
    tokens: Vec<&'a str>,
    rest: Option<&'a str>,
}

impl<'a> Args<'a> {
    fn required(&self, index: usize, argument: &'static str) -> Result<&'a str, CommandError> {
        self.tokens
            .get(index)
            .copied()
            .ok_or(CommandError::MissingArgument {
                command: self.command,
                argument,
            })
    }

    fn optional(&self, index: usize) -> Option<&'a str> {
        self.tokens.get(index).copied()
    }

    fn parse<T>(&self, index: usize, argument: &'static str) -> Result<T, CommandError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.required(index, argument)?
            .parse()
            .map_err(|e: T::Err| self.invalid(argument, e.to_string()))
    }

    fn invalid(&self, argument: &'static str, reason: impl Into<String>) -> CommandError {
        CommandError::InvalidArgument {
            command: self.command,
            argument,
            reason: reason.into(),
        }
    }

    fn json_rest(&self, argument: &'static str) -> Result<Option<Value>, CommandError> {
        self.rest
            .map(|raw| serde_json::from_str(raw).map_err(|e| self.invalid(argument, e.to_string())))
            .transpose()
    }

    fn required_json_rest(&self, argument: &'static str) -> Result<Value, CommandError> {
        self.json_rest(argument)?.ok_or(CommandError::MissingArgument {
            command: self.command,
            argument,
        })
    }
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let (head, _) = split_rest(line, 2);
        let verb = head.first().copied().unwrap_or_default();
        let sub = head.get(1).copied().unwrap_or_default();

        // (command label, tokens after the verb phrase, free-form tail after n tokens)
        let args = |command: &'static str, skip: usize, n: usize| {
            let (tokens, rest) = split_rest(line, skip + n);
            Args {
                command,
                tokens: tokens.into_iter().skip(skip).collect(),
                rest,
            }
        };

        match (verb, sub) {
            ("using", "user") => {
                let a = args("using user", 2, 4);
                let first = a.required(0, "ALG|null")?;
                if first == "null" {
                    return Ok(Command::ClearIdentity);
                }
                let algorithms = first
                    .split(',')
                    .map(|alg| alg.parse::<Algorithm>().map_err(|e| a.invalid("ALG", e.to_string())))
                    .collect::<Result<Vec<_>, _>>()?;
                let method = a.required(1, "did1|did2")?;
                let kind = IdentityKind::from_did_method(method)
                    .ok_or_else(|| a.invalid("did1|did2", format!("'{}'", method)))?;

                let (key, did) = match (a.optional(2), a.optional(3)) {
                    (Some(did), None) if did.starts_with("did:") => (None, Some(did.to_string())),
                    (key, did) => (key.map(str::to_string), did.map(str::to_string)),
                };
                Ok(Command::UseIdentity {
                    algorithms,
                    kind,
                    key,
                    did,
                })
            }
            ("onboarding", "authentication") => {
                let a = args("onboarding authentication", 2, 1);
                Ok(Command::Authenticate {
                    algorithm: a.parse(0, "ALG")?,
                })
            }
            ("authorisation", "siop") => {
                let (tokens, _) = split_rest(line, usize::MAX);
                let a = Args {
                    command: "authorisation siop",
                    tokens: tokens.into_iter().skip(2).collect(),
                    rest: None,
                };
                Ok(Command::Present {
                    algorithm: a.parse(0, "ALG")?,
                    credentials: a.tokens.iter().skip(1).map(|s| s.to_string()).collect(),
                })
            }
            ("credential", "issue") => {
                let a = args("credential issue", 2, 3);
                Ok(Command::IssueCredential {
                    variable: a.required(0, "var")?.to_string(),
                    validity: a.parse(1, "validity")?,
                    algorithm: match a.optional(2) {
                        Some(_) => Some(a.parse(2, "ALG")?),
                        None => None,
                    },
                })
            }
            ("transaction", _) => {
                let a = args("transaction", 1, 2);
                Ok(Command::Transact {
                    target: a.parse(0, "timestamp|tar")?,
                    method: a.required(1, "method")?.to_string(),
                    params: a.json_rest("json")?,
                })
            }
            ("timestamp", "hashes") => {
                let (tokens, _) = split_rest(line, usize::MAX);
                let hashes: Vec<String> = tokens.into_iter().skip(2).map(str::to_string).collect();
                if hashes.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: "timestamp hashes",
                        argument: "hex",
                    });
                }
                if let Some(bad) = hashes
                    .iter()
                    .find(|h| hex::decode(h.trim_start_matches("0x")).is_err())
                {
                    return Err(CommandError::InvalidArgument {
                        command: "timestamp hashes",
                        argument: "hex",
                        reason: format!("'{}' is not hex", bad),
                    });
                }
                Ok(Command::TimestampHashes { hashes })
            }
            ("timestamp", "get") => {
                let a = args("timestamp get", 2, 1);
                Ok(Command::GetTimestamp {
                    id: a.required(0, "id")?.to_string(),
                })
            }
            ("jsonrpc", _) => {
                let a = args("jsonrpc", 1, 3);
                let params = match a.json_rest("json-array")? {
                    None => Vec::new(),
                    Some(Value::Array(items)) => items,
                    Some(_) => return Err(a.invalid("json-array", "params must be a JSON array")),
                };
                Ok(Command::JsonRpc {
                    service: a.parse(0, "service")?,
                    id: RpcId::parse(a.required(1, "id")?),
                    method: a.required(2, "method")?.to_string(),
                    params,
                })
            }
            ("tar", "apps") => Ok(Command::ListApps),
            ("tar", "app") => {
                let a = args("tar app", 2, 1);
                Ok(Command::GetApp {
                    name: a.required(0, "name")?.to_string(),
                })
            }
            ("tar", "authorization") => {
                let a = args("tar authorization", 2, 1);
                Ok(Command::GetAuthorization {
                    id: a.required(0, "id")?.to_string(),
                })
            }
            ("notifications", "send") => {
                let a = args("notifications send", 2, 1);
                Ok(Command::SendNotification {
                    to: a.required(0, "did")?.to_string(),
                    payload: a.required_json_rest("json")?,
                })
            }
            ("notifications", "list") => Ok(Command::ListNotifications),
            ("datahub", "store") => {
                let a = args("datahub store", 2, 0);
                Ok(Command::StoreAttribute {
                    payload: a.required_json_rest("json")?,
                })
            }
            ("datahub", "get") => {
                let a = args("datahub get", 2, 1);
                Ok(Command::GetAttribute {
                    id: a.required(0, "id")?.to_string(),
                })
            }
            ("datahub", "list") => Ok(Command::ListAttributes),
            ("set", _) => {
                let a = args("set", 1, 1);
                Ok(Command::SetVariable {
                    name: a.required(0, "var")?.to_string(),
                    value: a
                        .rest
                        .ok_or(CommandError::MissingArgument {
                            command: "set",
                            argument: "value",
                        })?
                        .to_string(),
                })
            }
            ("view", _) => {
                let a = args("view", 1, 1);
                Ok(Command::ViewVariable {
                    name: a.required(0, "var")?.to_string(),
                })
            }
            ("header", "conformance") => {
                let a = args("header conformance", 2, 1);
                let id = a.required(0, "id|new")?;
                Ok(Command::SetConformanceHeader {
                    trace_id: (id != "new").then(|| id.to_string()),
                })
            }
            ("conformance-new", "check") => {
                let a = args("conformance-new check", 2, 1);
                let name = a.required(0, "name")?;
                Ok(Command::Check {
                    name: name
                        .parse()
                        .map_err(|e: UnknownCheck| a.invalid("name", e.to_string()))?,
                })
            }
            ("expect", "status") => {
                let a = args("expect status", 2, 1);
                Ok(Command::Expect(Expectation::Status(a.parse(0, "code")?)))
            }
            ("expect", "error") => {
                let a = args("expect error", 2, 0);
                let phrase = a.rest.ok_or(CommandError::MissingArgument {
                    command: "expect error",
                    argument: "phrase",
                })?;
                Ok(Command::Expect(Expectation::Error(phrase.to_string())))
            }
            ("reset", "") => Ok(Command::Reset),
            _ => Err(CommandError::UnknownCommand(line.trim().to_string())),
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::ClearIdentity => "clear_identity",
            Command::UseIdentity { .. } => "use_identity",
            Command::Authenticate { .. } => "authenticate",
            Command::Present { .. } => "present",
            Command::IssueCredential { .. } => "issue_credential",
            Command::Transact { .. } => "transact",
            Command::TimestampHashes { .. } => "timestamp_hashes",
            Command::GetTimestamp { .. } => "get_timestamp",
            Command::JsonRpc { .. } => "jsonrpc",
            Command::ListApps => "list_apps",
            Command::GetApp { .. } => "get_app",
            Command::GetAuthorization { .. } => "get_authorization",
            Command::SendNotification { .. } => "send_notification",
            Command::ListNotifications => "list_notifications",
            Command::StoreAttribute { .. } => "store_attribute",
            Command::GetAttribute { .. } => "get_attribute",
            Command::ListAttributes => "list_attributes",
            Command::SetVariable { .. } => "set_variable",
            Command::ViewVariable { .. } => "view_variable",
            Command::SetConformanceHeader { .. } => "set_conformance_header",
            Command::Check { .. } => "check",
            Command::Expect(_) => "expect",
            Command::Reset => "reset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_using_user_forms() {
        assert_eq!(Command::parse("using user null").unwrap(), Command::ClearIdentity);

        assert_eq!(
            Command::parse("using user ES256K,ES256 did1").unwrap(),
            Command::UseIdentity {
                algorithms: vec![Algorithm::Es256k, Algorithm::Es256],
                kind: IdentityKind::LegalEntity,
                key: None,
                did: None,
            }
        );

        assert_eq!(
            Command::parse("using user ES256K did1 0xabc did:ebsi:zFixed").unwrap(),
            Command::UseIdentity {
                algorithms: vec![Algorithm::Es256k],
                kind: IdentityKind::LegalEntity,
                key: Some("0xabc".into()),
                did: Some("did:ebsi:zFixed".into()),
            }
        );

        assert!(matches!(
            Command::parse("using user RS256 did2 did:key:z123").unwrap(),
            Command::UseIdentity { key: None, did: Some(_), .. }
        ));
    }

    #[test]
    fn test_unknown_algorithm_and_method() {
        assert!(matches!(
            Command::parse("using user HS256 did1"),
            Err(CommandError::InvalidArgument { argument: "ALG", .. })
        ));
        assert!(matches!(
            Command::parse("using user ES256 did3"),
            Err(CommandError::InvalidArgument { argument: "did1|did2", .. })
        ));
        assert!(matches!(
            Command::parse("onboarding authentication"),
            Err(CommandError::MissingArgument { argument: "ALG", .. })
        ));
    }

    #[test]
    fn test_unknown_verb() {
        assert_eq!(
            Command::parse("teleport now"),
            Err(CommandError::UnknownCommand("teleport now".into()))
        );
        assert!(matches!(Command::parse("tar delete x"), Err(CommandError::UnknownCommand(_))));
    }

    #[test]
    fn test_json_arguments_keep_spaces() {
        assert_eq!(
            Command::parse(r#"transaction tar insertIssuer {"did": "did:ebsi:zA", "level": 2}"#).unwrap(),
            Command::Transact {
                target: TransactionTarget::Tar,
                method: "insertIssuer".into(),
                params: Some(json!({"did": "did:ebsi:zA", "level": 2})),
            }
        );

        assert_eq!(
            Command::parse(r#"jsonrpc ledger 7 eth_blockNumber []"#).unwrap(),
            Command::JsonRpc {
                service: RpcService::Ledger,
                id: RpcId::Number(7),
                method: "eth_blockNumber".into(),
                params: vec![],
            }
        );

        assert!(matches!(
            Command::parse(r#"jsonrpc ledger 7 eth_call {"not": "array"}"#),
            Err(CommandError::InvalidArgument { argument: "json-array", .. })
        ));
    }

    #[test]
    fn test_presentation_and_credentials() {
        assert_eq!(
            Command::parse("authorisation siop ES256 vcA vcB").unwrap(),
            Command::Present {
                algorithm: Algorithm::Es256,
                credentials: vec!["vcA".into(), "vcB".into()],
            }
        );
        assert_eq!(
            Command::parse("credential issue vcA expired ES256K").unwrap(),
            Command::IssueCredential {
                variable: "vcA".into(),
                validity: CredentialValidity::Expired,
                algorithm: Some(Algorithm::Es256k),
            }
        );
    }

    #[test]
    fn test_checks_and_expectations() {
        assert_eq!(
            Command::parse("conformance-new check verifier_vp_expired_vc").unwrap(),
            Command::Check {
                name: CheckName::VerifierVpExpiredVc
            }
        );
        assert!(matches!(
            Command::parse("conformance-new check bogus"),
            Err(CommandError::InvalidArgument { argument: "name", .. })
        ));
        assert_eq!(
            Command::parse("expect status 400").unwrap(),
            Command::Expect(Expectation::Status(400))
        );
        assert_eq!(
            Command::parse("expect error key pair generation for RSA").unwrap(),
            Command::Expect(Expectation::Error("key pair generation for RSA".into()))
        );
    }

    #[test]
    fn test_misc_commands() {
        assert_eq!(
            Command::parse("set greeting hello world").unwrap(),
            Command::SetVariable {
                name: "greeting".into(),
                value: "hello world".into()
            }
        );
        assert_eq!(
            Command::parse("header conformance new").unwrap(),
            Command::SetConformanceHeader { trace_id: None }
        );
        assert!(matches!(
            Command::parse("timestamp hashes 0xzz"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert_eq!(Command::parse("  reset  ").unwrap(), Command::Reset);
        assert_eq!(Command::parse("datahub list").unwrap().kind(), "list_attributes");
    }
}
