use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};

use super::Caveat;

pub const COND_TIME_BEFORE: &str = "time-before";
pub const COND_DECLARED: &str = "declared";
pub const COND_NEED_DECLARED: &str = "need-declared";
pub const COND_IS_ENTITY: &str = "is-entity";
pub const COND_ALLOW: &str = "allow";
pub const COND_DENY: &str = "deny";
pub const COND_AGREED_TERMS: &str = "agreed-terms";

pub fn time_before(t: DateTime<Utc>) -> Caveat {
    Caveat::first_party(format!(
        "{COND_TIME_BEFORE} {}",
        t.to_rfc3339_opts(SecondsFormat::Secs, true)
    ))
}

pub fn declared(key: &str, value: &str) -> Caveat {
    Caveat::first_party(format!("{COND_DECLARED} {key} {value}"))
}

/// Third-party caveat asking `location` to check `condition` and declare
/// every key in `keys` in its discharge.
pub fn need_declared(location: &str, condition: &str, keys: &[&str]) -> Caveat {
    Caveat::third_party(
        location,
        format!("{COND_NEED_DECLARED} {} {condition}", keys.join(",")),
    )
}

pub fn is_entity(ids: &[String]) -> Caveat {
    Caveat::first_party(format!("{COND_IS_ENTITY} {}", ids.join(" ")))
}

pub fn deny(ops: &[&str]) -> Caveat {
    Caveat::first_party(format!("{COND_DENY} {}", ops.join(" ")))
}

/// Restricts a macaroon to operations whose required terms are all among
/// `terms`.
pub fn agreed_terms(terms: &[String]) -> Caveat {
    Caveat::first_party(format!("{COND_AGREED_TERMS} {}", terms.join(" ")))
}

/// Splits a condition into its name and argument.
pub fn parse_condition(cond: &str) -> (&str, &str) {
    match cond.split_once(' ') {
        Some((name, arg)) => (name, arg),
        None => (cond, ""),
    }
}

/// Every context value a first-party caveat can be checked against. Built
/// per request and passed in explicitly; checkers never reach for request
/// state on their own.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub now: DateTime<Utc>,
    pub operation: String,
    /// For each entity implicated by the operation, the accepted spellings
    /// of its id (owner-namespaced and, if any, promulgated).
    pub entities: Vec<Vec<String>>,
    /// Terms required by the implicated entities.
    pub terms: Vec<String>,
}

/// Attributes declared by `declared` caveats across a macaroon and its
/// discharges. A key declared twice with different values is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declared {
    values: BTreeMap<String, String>,
}

impl Declared {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

pub fn infer_declared<'a>(conditions: impl IntoIterator<Item = &'a str>) -> Declared {
    let mut values = BTreeMap::new();
    let mut conflicts = BTreeSet::new();
    for cond in conditions {
        let (name, arg) = parse_condition(cond);
        if name != COND_DECLARED {
            continue;
        }
        let (key, value) = match arg.split_once(' ') {
            Some((key, value)) => (key, value),
            None => (arg, ""),
        };
        if conflicts.contains(key) {
            continue;
        }
        match values.get(key) {
            Some(old) if old != value => {
                values.remove(key);
                conflicts.insert(key.to_string());
            }
            Some(_) => {}
            None => {
                values.insert(key.to_string(), value.to_string());
            }
        }
    }
    Declared { values }
}

/// Checks one first-party condition. Unknown conditions are never
/// satisfied.
pub fn check_condition(cond: &str, ctx: &CheckContext, declared: &Declared) -> Result<(), String> {
    let (name, arg) = parse_condition(cond);
    match name {
        COND_TIME_BEFORE => check_time_before(arg, ctx.now),
        COND_DECLARED => check_declared(arg, declared),
        COND_IS_ENTITY => check_is_entity(arg, &ctx.entities),
        COND_ALLOW => check_allow(arg, &ctx.operation),
        COND_DENY => check_deny(arg, &ctx.operation),
        COND_AGREED_TERMS => check_agreed_terms(arg, &ctx.terms),
        _ => Err(format!("caveat {name:?} not recognized")),
    }
}

fn check_time_before(arg: &str, now: DateTime<Utc>) -> Result<(), String> {
    let t = DateTime::parse_from_rfc3339(arg).map_err(|e| format!("invalid time: {e}"))?;
    if now >= t {
        return Err(String::from("macaroon has expired"));
    }
    Ok(())
}

fn check_declared(arg: &str, declared: &Declared) -> Result<(), String> {
    let (key, value) = match arg.split_once(' ') {
        Some((key, value)) => (key, value),
        None => (arg, ""),
    };
    match declared.get(key) {
        Some(v) if v == value => Ok(()),
        Some(v) => Err(format!("got {key}={v:?}, expected {value:?}")),
        None => Err(format!("got {key}=null, expected {value:?}")),
    }
}

fn check_is_entity(arg: &str, entities: &[Vec<String>]) -> Result<(), String> {
    if entities.is_empty() {
        return Err(format!(
            "API operation does not involve expected entity {arg}"
        ));
    }
    let allowed: BTreeSet<&str> = arg.split_whitespace().collect();
    for spellings in entities {
        if !spellings.iter().any(|id| allowed.contains(id.as_str())) {
            let id = spellings.first().map(String::as_str).unwrap_or_default();
            return Err(format!("operation on entity {id} not allowed"));
        }
    }
    Ok(())
}

fn check_allow(arg: &str, operation: &str) -> Result<(), String> {
    if arg.split_whitespace().any(|op| op == operation) {
        return Ok(());
    }
    Err(format!("{operation} not allowed"))
}

fn check_deny(arg: &str, operation: &str) -> Result<(), String> {
    if arg.split_whitespace().any(|op| op == operation) {
        return Err(format!("{operation} not allowed"));
    }
    Ok(())
}

fn check_agreed_terms(arg: &str, terms: &[String]) -> Result<(), String> {
    let agreed: BTreeSet<&str> = arg.split_whitespace().collect();
    match terms.iter().find(|t| !agreed.contains(t.as_str())) {
        Some(term) => Err(format!("terms {term} not agreed")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn ctx(op: &str, entities: Vec<Vec<&str>>) -> CheckContext {
        CheckContext {
            now: Utc::now(),
            operation: op.to_string(),
            entities: entities
                .into_iter()
                .map(|e| e.into_iter().map(String::from).collect())
                .collect(),
            terms: Vec::new(),
        }
    }

    fn condition(caveat: Caveat) -> String {
        match caveat {
            Caveat::FirstParty(cond) => cond,
            Caveat::ThirdParty { .. } => panic!("expected first party caveat"),
        }
    }

    #[test]
    fn test_time_before() {
        let declared = Declared::default();
        let ctx = ctx("other", vec![]);

        let future = condition(time_before(ctx.now + Duration::hours(24)));
        assert!(check_condition(&future, &ctx, &declared).is_ok());

        let past = condition(time_before(ctx.now - Duration::seconds(1)));
        assert_eq!(
            check_condition(&past, &ctx, &declared).unwrap_err(),
            "macaroon has expired"
        );

        assert!(check_condition("time-before yesterday", &ctx, &declared).is_err());
    }

    #[test]
    fn test_is_entity() {
        let declared = Declared::default();
        let cond = condition(is_entity(&[
            String::from("cs:~bob/trusty/wordpress-3"),
            String::from("cs:trusty/mysql-5"),
        ]));

        let single = ctx("other", vec![vec!["cs:~bob/trusty/wordpress-3"]]);
        assert!(check_condition(&cond, &single, &declared).is_ok());

        // Promulgated spelling is accepted for an owner-namespaced entity.
        let promulgated = ctx(
            "other",
            vec![vec!["cs:~charmers/trusty/mysql-12", "cs:trusty/mysql-5"]],
        );
        assert!(check_condition(&cond, &promulgated, &declared).is_ok());

        // Every implicated entity must be listed.
        let both = ctx(
            "other",
            vec![
                vec!["cs:~bob/trusty/wordpress-3"],
                vec!["cs:~bob/trusty/haproxy-1"],
            ],
        );
        let err = check_condition(&cond, &both, &declared).unwrap_err();
        assert!(err.contains("cs:~bob/trusty/haproxy-1"));

        let none = ctx("other", vec![]);
        assert!(check_condition(&cond, &none, &declared).is_err());
    }

    #[test]
    fn test_operations() {
        let declared = Declared::default();
        let deny_terms = condition(deny(&["op-get-with-terms"]));
        let allow_other = format!("{COND_ALLOW} other");

        let other = ctx("other", vec![]);
        let terms = ctx("op-get-with-terms", vec![]);

        assert!(check_condition(&deny_terms, &other, &declared).is_ok());
        assert!(check_condition(&deny_terms, &terms, &declared).is_err());
        assert!(check_condition(&allow_other, &other, &declared).is_ok());
        assert!(check_condition(&allow_other, &terms, &declared).is_err());
    }

    #[test]
    fn test_declared() {
        let conds = [
            String::from("declared username bob"),
            String::from("time-before 2100-01-01T00:00:00Z"),
            String::from("declared username bob"),
            String::from("declared groups "),
        ];
        let declared = infer_declared(conds.iter().map(String::as_str));
        assert_eq!(declared.get("username"), Some("bob"));
        assert_eq!(declared.get("groups"), Some(""));

        let ctx = ctx("other", vec![]);
        assert!(check_condition("declared username bob", &ctx, &declared).is_ok());
        assert!(check_condition("declared username alice", &ctx, &declared).is_err());

        // A holder adding a conflicting declaration loses the attribute.
        let conds = ["declared username bob", "declared username admin"];
        let declared = infer_declared(conds);
        assert_eq!(declared.get("username"), None);
        assert!(check_condition("declared username bob", &ctx, &declared).is_err());
        let conds = [
            "declared username bob",
            "declared username admin",
            "declared username bob",
        ];
        assert_eq!(infer_declared(conds).get("username"), None);
    }

    #[test]
    fn test_agreed_terms() {
        let declared = Declared::default();
        let cond = condition(agreed_terms(&[
            String::from("canonical/eula"),
            String::from("bob/terms/1"),
        ]));

        let mut ctx = ctx("op-get-with-terms", vec![]);
        assert!(check_condition(&cond, &ctx, &declared).is_ok());
        ctx.terms = vec![String::from("bob/terms/1")];
        assert!(check_condition(&cond, &ctx, &declared).is_ok());
        ctx.terms = vec![String::from("bob/terms/1"), String::from("alice/terms/2")];
        let err = check_condition(&cond, &ctx, &declared).unwrap_err();
        assert!(err.contains("alice/terms/2"));
    }

    #[test]
    fn test_unknown_condition() {
        let ctx = ctx("other", vec![]);
        let err = check_condition("always-true", &ctx, &Declared::default()).unwrap_err();
        assert!(err.contains("not recognized"));
    }

    #[test]
    fn test_need_declared() {
        match need_declared("https://id.example.com", "is-authenticated-user", &["username"]) {
            Caveat::ThirdParty {
                location,
                condition,
            } => {
                assert_eq!(location, "https://id.example.com");
                assert_eq!(condition, "need-declared username is-authenticated-user");
            }
            Caveat::FirstParty(_) => panic!("expected third party caveat"),
        }
    }
}
