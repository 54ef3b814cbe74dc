/// Maximum length of an allocated logical id.
const MAX_LOGICAL_ID_LEN: usize = 255;

/// Maximum length of the human-readable prefix when a hash suffix is appended.
const MAX_HUMAN_LEN: usize = 240;

/// Path components with this id are dropped entirely.
const HIDDEN_ID: &str = "Default";

/// A trailing sentinel on the last component (and whole components inside
/// hashed paths) that carries no naming information.
const RESOURCE_SENTINEL: &str = "Resource";

/// Allocate a deterministic, bounded, Terraform-safe logical id from the
/// construct path components below the containing stack.
///
/// Single meaningful components come through almost verbatim so shallow trees
/// stay readable; deeper paths get an MD5-derived suffix that keeps ids
/// collision-free after character stripping.
pub fn allocate_logical_id(components: &[String]) -> String {
    let mut comps: Vec<&str> = components
        .iter()
        .map(|c| c.as_str())
        .filter(|c| *c != HIDDEN_ID)
        .collect();

    if let Some(last) = comps.last_mut() {
        let cur: &str = *last;
        if cur.len() > RESOURCE_SENTINEL.len() && cur.ends_with(RESOURCE_SENTINEL) {
            *last = &cur[..cur.len() - RESOURCE_SENTINEL.len()];
        }
    }

    if comps.is_empty() {
        return String::new();
    }

    if comps.len() == 1 {
        let candidate = strip_to_id_charset(comps[0]);
        if candidate.len() <= MAX_LOGICAL_ID_LEN {
            return candidate;
        }
    }

    let hash = path_hash(&comps);

    // Foo/FooBar collapses to FooBar; the longer component carries the name.
    let mut human_parts: Vec<&str> = Vec::new();
    for comp in comps.iter().filter(|c| **c != RESOURCE_SENTINEL) {
        if let Some(prev) = human_parts.last() {
            if comp.ends_with(prev) {
                human_parts.pop();
            }
        }
        human_parts.push(comp);
    }

    let mut human = human_parts
        .iter()
        .map(|c| strip_alphanumeric(c))
        .collect::<Vec<_>>()
        .join("_");
    human.truncate(MAX_HUMAN_LEN);

    format!("{}_{}", human, hash)
}

/// First 8 hex chars of the MD5 of the joined path, uppercased.
fn path_hash(components: &[&str]) -> String {
    let digest = md5::compute(components.join("/").as_bytes());
    hex::encode(digest.0)[..8].to_uppercase()
}

fn strip_to_id_charset(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn strip_alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}
