//! Line-oriented result protocol shared by MaxSAT solvers and the preprocessor.
//!
//! Collaborators report `s <STATUS>` once, optionally `o <cost>` progress
//! lines, and `v <assignment>` for the model. The raw text is decoded exactly
//! once here; nothing past this module sees status tokens as strings.
use serde::Serialize;
use std::fmt;

/// Closed status vocabulary after decoding.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolverStatus {
    Satisfiable,
    Unsatisfiable,
    Optimal,
    Timeout,
    Error,
    ProtocolError,
}

impl SolverStatus {
    /// Decode a status token. `None` means the token is outside the vocabulary.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "OPTIMUM" | "OPTIMAL" => Some(SolverStatus::Optimal),
            "SATISFIABLE" => Some(SolverStatus::Satisfiable),
            "UNSATISFIABLE" => Some(SolverStatus::Unsatisfiable),
            "TIMEOUT" | "UNKNOWN" => Some(SolverStatus::Timeout),
            "ERROR" => Some(SolverStatus::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SolverStatus::Satisfiable => "SATISFIABLE",
            SolverStatus::Unsatisfiable => "UNSATISFIABLE",
            SolverStatus::Optimal => "OPTIMAL",
            SolverStatus::Timeout => "TIMEOUT",
            SolverStatus::Error => "ERROR",
            SolverStatus::ProtocolError => "PROTOCOL_ERROR",
        }
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed literals, one per decided variable; the sign is the truth value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariableAssignment(Vec<i64>);

impl VariableAssignment {
    pub fn literals(&self) -> &[i64] {
        &self.0
    }
}

impl From<Vec<i64>> for VariableAssignment {
    fn from(literals: Vec<i64>) -> Self {
        Self(literals)
    }
}

/// A model reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub assignment: VariableAssignment,
    /// Payload of the `v` line(s), verbatim apart from line joining.
    pub raw: String,
    /// Last `o` line seen before the model, if any.
    pub cost: Option<u64>,
}

impl Model {
    /// Render the payload back as a protocol model line.
    pub fn line(&self) -> String {
        format!("v {}", self.raw)
    }
}

/// Typed outcome of one solver invocation. Only SATISFIABLE and OPTIMAL carry
/// a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverOutcome {
    Satisfiable(Model),
    Optimal(Model),
    Unsatisfiable,
    Timeout,
    Error,
    ProtocolError(String),
}

impl SolverOutcome {
    pub fn status(&self) -> SolverStatus {
        match self {
            SolverOutcome::Satisfiable(_) => SolverStatus::Satisfiable,
            SolverOutcome::Optimal(_) => SolverStatus::Optimal,
            SolverOutcome::Unsatisfiable => SolverStatus::Unsatisfiable,
            SolverOutcome::Timeout => SolverStatus::Timeout,
            SolverOutcome::Error => SolverStatus::Error,
            SolverOutcome::ProtocolError(_) => SolverStatus::ProtocolError,
        }
    }

    /// The model, when the outcome is usable.
    pub fn model(&self) -> Option<&Model> {
        match self {
            SolverOutcome::Satisfiable(model) | SolverOutcome::Optimal(model) => Some(model),
            _ => None,
        }
    }

    fn protocol(detail: impl Into<String>) -> Self {
        SolverOutcome::ProtocolError(detail.into())
    }
}

/// Decode solver output into a [`SolverOutcome`]. Never fails: anything
/// unusable becomes [`SolverOutcome::ProtocolError`].
///
/// `variables` is the variable count declared by the solved formula, used to
/// tell a bit-string model from a lone DIMACS literal.
pub fn parse_solver_output(text: &str, variables: Option<usize>) -> SolverOutcome {
    let lines = match scan_lines(text) {
        Ok(lines) => lines,
        Err(detail) => return SolverOutcome::protocol(detail),
    };

    let status = match lines.status_token {
        Some(token) => match SolverStatus::from_token(token) {
            Some(status) => status,
            None => {
                tracing::warn!(token, "unrecognized status token");
                return SolverOutcome::protocol(format!("cannot decode status token {token:?}"));
            }
        },
        None if lines.model.is_some() => {
            return SolverOutcome::protocol("model line without status line");
        }
        None => return SolverOutcome::protocol("no status line in output"),
    };

    match status {
        SolverStatus::Satisfiable | SolverStatus::Optimal => {
            let Some(raw) = lines.model else {
                return SolverOutcome::protocol(format!("status {status} without model line"));
            };
            let assignment = match parse_assignment(&raw, variables) {
                Ok(assignment) => assignment,
                Err(detail) => return SolverOutcome::protocol(detail),
            };
            let model = Model {
                assignment,
                raw,
                cost: lines.cost,
            };
            if status == SolverStatus::Optimal {
                SolverOutcome::Optimal(model)
            } else {
                SolverOutcome::Satisfiable(model)
            }
        }
        SolverStatus::Unsatisfiable => SolverOutcome::Unsatisfiable,
        SolverStatus::Timeout => SolverOutcome::Timeout,
        SolverStatus::Error => SolverOutcome::Error,
        SolverStatus::ProtocolError => SolverOutcome::protocol("unreachable status"),
    }
}

/// Decode reconstructor output, which only has to contain a model line.
pub fn parse_model_output(text: &str, variables: Option<usize>) -> Result<Model, String> {
    let lines = scan_lines(text)?;
    let raw = lines
        .model
        .ok_or_else(|| "no model line in output".to_string())?;
    let assignment = parse_assignment(&raw, variables)?;
    Ok(Model {
        assignment,
        raw,
        cost: lines.cost,
    })
}

/// Decode an assignment payload in either DIMACS-literal or bit-string form.
///
/// A single token such as `10` is valid in both forms. With a known variable
/// count it is a bit-string only when its length matches that count. Without
/// one it is a bit-string only when it cannot be a DIMACS literal: a leading
/// `0`, or too long to fit an `i64`.
pub fn parse_assignment(
    raw: &str,
    variables: Option<usize>,
) -> Result<VariableAssignment, String> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if let [single] = tokens.as_slice() {
        if is_bit_string(single, variables) {
            return Ok(bit_string_assignment(single));
        }
    }
    let mut literals = Vec::with_capacity(tokens.len());
    for (idx, token) in tokens.iter().enumerate() {
        let literal: i64 = token
            .parse()
            .map_err(|_| format!("invalid literal {token:?} in model line"))?;
        if literal == 0 {
            if idx + 1 != tokens.len() {
                return Err("literal 0 before end of model line".to_string());
            }
            break;
        }
        literals.push(literal);
    }
    Ok(VariableAssignment(literals))
}

fn is_bit_string(token: &str, variables: Option<usize>) -> bool {
    if token.len() < 2 || !token.bytes().all(|b| b == b'0' || b == b'1') {
        return false;
    }
    match variables {
        Some(count) => token.len() == count,
        None => token.starts_with('0') || token.parse::<i64>().is_err(),
    }
}

/// Variable count from a `p wcnf <vars> ...` (or `p cnf`) header line.
///
/// Only the comment preamble is searched; formulas in the header-less WCNF
/// format yield `None`.
pub fn declared_variable_count<I, S>(lines: I) -> Option<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() || line.starts_with('c') {
            continue;
        }
        let mut words = line.split_whitespace();
        if words.next() != Some("p") {
            return None;
        }
        return match words.next() {
            Some("wcnf" | "cnf") => words.next()?.parse().ok(),
            _ => None,
        };
    }
    None
}

fn bit_string_assignment(bits: &str) -> VariableAssignment {
    let literals = bits
        .bytes()
        .zip(1i64..)
        .map(|(bit, var)| if bit == b'1' { var } else { -var })
        .collect();
    VariableAssignment(literals)
}

struct ScannedLines<'a> {
    status_token: Option<&'a str>,
    model: Option<String>,
    cost: Option<u64>,
}

fn scan_lines(text: &str) -> Result<ScannedLines<'_>, String> {
    let mut scanned = ScannedLines {
        status_token: None,
        model: None,
        cost: None,
    };
    for line in text.lines().map(str::trim) {
        let Some((tag, rest)) = split_tag(line) else {
            continue;
        };
        match tag {
            's' => {
                let token = rest.split_whitespace().next().unwrap_or_default();
                if token.is_empty() {
                    return Err("empty status line".to_string());
                }
                match scanned.status_token {
                    Some(previous) if previous != token => {
                        return Err(format!(
                            "conflicting status lines {previous:?} and {token:?}"
                        ));
                    }
                    _ => scanned.status_token = Some(token),
                }
            }
            'v' => {
                let payload = rest.trim();
                match scanned.model.as_mut() {
                    Some(model) if !payload.is_empty() => {
                        model.push(' ');
                        model.push_str(payload);
                    }
                    Some(_) => {}
                    None => scanned.model = Some(payload.to_string()),
                }
            }
            'o' => {
                let cost = rest
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid cost line {line:?}"))?;
                scanned.cost = Some(cost);
            }
            _ => {}
        }
    }
    Ok(scanned)
}

/// Split `x payload` into its one-letter tag; `c` comments and blank lines
/// yield nothing.
fn split_tag(line: &str) -> Option<(char, &str)> {
    let mut chars = line.chars();
    let tag = chars.next()?;
    let rest = chars.as_str();
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    match tag {
        's' | 'v' | 'o' => Some((tag, rest)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_vocabulary_maps_to_closed_set() {
        let cases = [
            ("OPTIMUM", Some(SolverStatus::Optimal)),
            ("OPTIMAL", Some(SolverStatus::Optimal)),
            ("SATISFIABLE", Some(SolverStatus::Satisfiable)),
            ("UNSATISFIABLE", Some(SolverStatus::Unsatisfiable)),
            ("TIMEOUT", Some(SolverStatus::Timeout)),
            ("UNKNOWN", Some(SolverStatus::Timeout)),
            ("ERROR", Some(SolverStatus::Error)),
            ("optimum", None),
            ("FOUND", None),
        ];
        for (token, expected) in cases {
            assert_eq!(SolverStatus::from_token(token), expected, "token {token}");
        }
    }

    #[test]
    fn optimum_with_model_yields_optimal_assignment() {
        let outcome = parse_solver_output("s OPTIMUM\nv -1 2 -3\n", None);
        assert_eq!(outcome.status(), SolverStatus::Optimal);
        let model = outcome.model().expect("model");
        assert_eq!(model.assignment.literals(), &[-1, 2, -3]);
        assert_eq!(model.raw, "-1 2 -3");
        assert_eq!(model.line(), "v -1 2 -3");
    }

    #[test]
    fn status_token_is_first_word() {
        let outcome = parse_solver_output("c pumpkin\ns OPTIMUM FOUND\nv 1 -2 0\n", None);
        assert_eq!(outcome.status(), SolverStatus::Optimal);
        assert_eq!(outcome.model().expect("model").assignment.literals(), &[1, -2]);
    }

    #[test]
    fn satisfiable_keeps_last_cost() {
        let outcome = parse_solver_output("o 12\no 7\nv 1 2\ns SATISFIABLE\n", None);
        let SolverOutcome::Satisfiable(model) = outcome else {
            panic!("expected satisfiable, got {outcome:?}");
        };
        assert_eq!(model.cost, Some(7));
    }

    #[test]
    fn non_model_outcomes_carry_no_assignment() {
        assert_eq!(
            parse_solver_output("s UNSATISFIABLE\n", None),
            SolverOutcome::Unsatisfiable
        );
        assert_eq!(parse_solver_output("s UNKNOWN\n", None), SolverOutcome::Timeout);
        assert_eq!(parse_solver_output("s TIMEOUT\n", None), SolverOutcome::Timeout);
        assert_eq!(parse_solver_output("s ERROR\n", None), SolverOutcome::Error);
        assert!(parse_solver_output("s UNSATISFIABLE\nv 1\n", None).model().is_none());
    }

    #[test]
    fn unknown_token_is_protocol_error() {
        let outcome = parse_solver_output("s MAYBE\nv 1\n", None);
        let SolverOutcome::ProtocolError(detail) = outcome else {
            panic!("expected protocol error, got {outcome:?}");
        };
        assert!(detail.contains("MAYBE"));
    }

    #[test]
    fn stray_model_without_status_is_rejected() {
        let outcome = parse_solver_output("v 1 -2 3\n", None);
        assert_eq!(outcome.status(), SolverStatus::ProtocolError);
        assert!(outcome.model().is_none());
    }

    #[test]
    fn satisfiable_without_model_is_protocol_error() {
        assert_eq!(
            parse_solver_output("s SATISFIABLE\n", None).status(),
            SolverStatus::ProtocolError
        );
        assert_eq!(
            parse_solver_output("s OPTIMUM\n", None).status(),
            SolverStatus::ProtocolError
        );
    }

    #[test]
    fn empty_and_garbage_output_are_protocol_errors() {
        assert_eq!(parse_solver_output("", None).status(), SolverStatus::ProtocolError);
        assert_eq!(
            parse_solver_output("segmentation fault\n", None).status(),
            SolverStatus::ProtocolError
        );
        assert_eq!(parse_solver_output("s\n", None).status(), SolverStatus::ProtocolError);
        assert_eq!(
            parse_solver_output("s OPTIMUM\nv 1 x 3\n", None).status(),
            SolverStatus::ProtocolError
        );
        assert_eq!(
            parse_solver_output("o lots\ns OPTIMUM\nv 1\n", None).status(),
            SolverStatus::ProtocolError
        );
    }

    #[test]
    fn conflicting_status_lines_are_rejected() {
        let outcome = parse_solver_output("s SATISFIABLE\ns UNSATISFIABLE\nv 1\n", None);
        assert_eq!(outcome.status(), SolverStatus::ProtocolError);
        let repeated = parse_solver_output("s OPTIMUM\ns OPTIMUM\nv 1\n", None);
        assert_eq!(repeated.status(), SolverStatus::Optimal);
    }

    #[test]
    fn split_model_lines_are_joined() {
        let outcome = parse_solver_output("s SATISFIABLE\nv 1 -2\nv 3 0\n", None);
        let model = outcome.model().expect("model");
        assert_eq!(model.raw, "1 -2 3 0");
        assert_eq!(model.assignment.literals(), &[1, -2, 3]);
    }

    #[test]
    fn bit_string_models_decode_positionally() {
        let assignment = parse_assignment("0110", None).expect("bit string");
        assert_eq!(assignment.literals(), &[-1, 2, 3, -4]);
        assert_eq!(parse_assignment("1", None).expect("single").literals(), &[1]);
        assert!(parse_assignment("1 0 2", None).is_err());
        let wide = "1".repeat(40);
        assert_eq!(parse_assignment(&wide, None).expect("wide").literals().len(), 40);
    }

    #[test]
    fn lone_literal_is_not_mistaken_for_bit_string() {
        let outcome = parse_solver_output("s OPTIMUM\nv 10\n", None);
        assert_eq!(outcome.model().expect("model").assignment.literals(), &[10]);
        let outcome = parse_solver_output("s OPTIMUM\nv 11\n", Some(11));
        assert_eq!(outcome.model().expect("model").assignment.literals(), &[11]);
    }

    #[test]
    fn declared_variable_count_selects_bit_string_form() {
        let outcome = parse_solver_output("s OPTIMUM\nv 10\n", Some(2));
        assert_eq!(outcome.model().expect("model").assignment.literals(), &[1, -2]);
        let model = parse_model_output("v 1011\n", Some(4)).expect("model");
        assert_eq!(model.assignment.literals(), &[1, -2, 3, 4]);
    }

    #[test]
    fn variable_count_is_read_from_header() {
        let formula = ["c encoded plan", "p wcnf 3 2 10", "10 1 2 0"];
        assert_eq!(declared_variable_count(formula), Some(3));
        assert_eq!(declared_variable_count(["p cnf 7 1", "1 0"]), Some(7));
        assert_eq!(declared_variable_count(["h 1 2 0", "3 -1 0"]), None);
        assert_eq!(declared_variable_count(["p wcnf many"]), None);
        assert_eq!(declared_variable_count(Vec::<String>::new()), None);
    }

    #[test]
    fn words_starting_with_tag_letters_are_ignored() {
        let outcome = parse_solver_output("solving...\nversion 2\ns OPTIMUM\nv 4\n", None);
        assert_eq!(outcome.status(), SolverStatus::Optimal);
        assert_eq!(outcome.model().expect("model").assignment.literals(), &[4]);
    }

    #[test]
    fn reconstruction_output_only_needs_model() {
        let model = parse_model_output("c reconstructed\nv 1 -2 3 -4\n", None).expect("model");
        assert_eq!(model.assignment.literals().len(), 4);
        assert!(parse_model_output("s OPTIMUM\n", None).is_err());
        assert!(parse_model_output("", None).is_err());
    }
}
