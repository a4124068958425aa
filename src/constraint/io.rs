//! Constraint files: one constraint per line.

use std::fs;
use std::path::Path;

use super::{Constraint, ConstraintSet};
use crate::error::LabelFuseError;

/// Loads every constraint of a file into one set.
///
/// A trailing newline is allowed; any other empty line is a syntax error.
pub fn load_constraints(path: &Path) -> Result<ConstraintSet, LabelFuseError> {
    let contents = fs::read_to_string(path).map_err(LabelFuseError::Io)?;
    parse_lines(&contents, &path.display().to_string())
}

/// Writes one constraint per line.
pub fn save_constraints(path: &Path, constraints: &ConstraintSet) -> Result<(), LabelFuseError> {
    fs::write(path, to_constraints_string(constraints)).map_err(LabelFuseError::Io)
}

/// Parses constraints from text, one per line.
pub fn from_constraints_str(contents: &str) -> Result<ConstraintSet, LabelFuseError> {
    parse_lines(contents, "<string>")
}

pub fn to_constraints_string(constraints: &ConstraintSet) -> String {
    constraints
        .iter()
        .map(|constraint| format!("{}\n", constraint))
        .collect()
}

fn parse_lines(contents: &str, source: &str) -> Result<ConstraintSet, LabelFuseError> {
    let mut constraints = ConstraintSet::new();
    for (index, line) in contents.lines().enumerate() {
        let constraint = Constraint::parse(line).map_err(|err| match err {
            LabelFuseError::InvalidConstraintSyntax { message, .. } => {
                LabelFuseError::InvalidConstraintSyntax {
                    location: format!("{}:{}", source, index + 1),
                    message,
                }
            }
            other => other,
        })?;
        constraints.insert(constraint);
    }
    Ok(constraints)
}
