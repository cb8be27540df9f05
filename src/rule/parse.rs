//! The `@rule` text format.
//!
//! ```text
//! # Transitivity of inheritance.
//! @rule deduction
//!   match: (Inheritance $A $B), (Inheritance $B $C)
//!   produce: (Inheritance $A $C)
//!   tv: 0.9 0.6
//!   cost: 2.0
//!
//! @meta transitive-relations
//!   match: (Transitive $R)
//!   template: transitive
//!   template-match: (Evaluation $R (List $A $B)), (Evaluation $R (List $B $C))
//!   template-produce: (Evaluation $R (List $A $C))
//! ```
//!
//! A block starts at `@rule name` or `@meta name` and runs until a blank line
//! or the next `@`. Lines starting with `#` or `;` are comments. For meta
//! blocks, `tv:` and `cost:` apply to the template.

use tracing::warn;

use crate::error::{RuleError, RuleResult};
use crate::sexpr::{parse_term, parse_terms};

use super::{Rule, Term, TruthValue};

/// Parse every rule block in `text`.
pub fn parse_rules(text: &str) -> RuleResult<Vec<Rule>> {
    let mut rules = Vec::new();
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        let (is_meta, rest) = if let Some(rest) = trimmed.strip_prefix("@rule") {
            (false, rest)
        } else if let Some(rest) = trimmed.strip_prefix("@meta") {
            (true, rest)
        } else {
            // Lines outside a block are ignored.
            continue;
        };

        let name = rest.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(RuleError::Parse {
                rule_name: name.to_string(),
                message: "a rule block needs exactly one name".into(),
            });
        }

        let mut block = Block::new(name);
        while let Some(next) = lines.peek() {
            let next_trimmed = next.trim();
            if next_trimmed.is_empty() || next_trimmed.starts_with('@') {
                break;
            }
            lines.next();
            if is_comment(next_trimmed) {
                continue;
            }
            block.read_line(next_trimmed)?;
        }

        rules.push(if is_meta { block.into_meta()? } else { block.into_rule()? });
    }

    Ok(rules)
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with(';')
}

/// Fields collected from the lines of one block.
struct Block {
    name: String,
    premises: Vec<Term>,
    produce: Option<Term>,
    template_name: Option<String>,
    template_premises: Vec<Term>,
    template_produce: Option<Term>,
    tv: Option<TruthValue>,
    cost: Option<f64>,
}

impl Block {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            premises: Vec::new(),
            produce: None,
            template_name: None,
            template_premises: Vec::new(),
            template_produce: None,
            tv: None,
            cost: None,
        }
    }

    fn error(&self, message: impl Into<String>) -> RuleError {
        RuleError::Parse {
            rule_name: self.name.clone(),
            message: message.into(),
        }
    }

    fn terms(&self, text: &str) -> RuleResult<Vec<Term>> {
        parse_terms(text).map_err(|e| self.error(e.to_string()))
    }

    fn term(&self, text: &str) -> RuleResult<Term> {
        parse_term(text).map_err(|e| self.error(e.to_string()))
    }

    fn read_line(&mut self, line: &str) -> RuleResult<()> {
        let Some((key, value)) = line.split_once(':') else {
            return Err(self.error(format!("expected 'key: value', found '{line}'")));
        };
        let value = value.trim();

        match key.trim() {
            "match" => {
                let terms = self.terms(value)?;
                self.premises.extend(terms);
            }
            "produce" => self.produce = Some(self.term(value)?),
            "template" => self.template_name = Some(value.to_string()),
            "template-match" => {
                let terms = self.terms(value)?;
                self.template_premises.extend(terms);
            }
            "template-produce" => self.template_produce = Some(self.term(value)?),
            "tv" => self.tv = Some(self.truth_value(value)?),
            "cost" => {
                let cost = value
                    .parse::<f64>()
                    .map_err(|e| self.error(format!("invalid cost: {e}")))?;
                if !cost.is_finite() || cost < 0.0 {
                    return Err(self.error(format!("cost must be finite and non-negative, got {cost}")));
                }
                self.cost = Some(cost);
            }
            other => warn!(rule = %self.name, key = other, "skipping unknown rule key"),
        }
        Ok(())
    }

    fn truth_value(&self, value: &str) -> RuleResult<TruthValue> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        let [mean, confidence] = parts.as_slice() else {
            return Err(self.error("tv takes a mean and a confidence, e.g. 'tv: 0.9 0.5'"));
        };
        let parse = |s: &str| {
            s.parse::<f64>()
                .map_err(|e| self.error(format!("invalid truth value component '{s}': {e}")))
        };
        let (mean, confidence) = (parse(*mean)?, parse(*confidence)?);
        TruthValue::new(mean, confidence).ok_or_else(|| RuleError::InvalidTruthValue {
            rule_name: self.name.clone(),
            mean,
            confidence,
        })
    }

    fn finish(rule: Rule, tv: Option<TruthValue>, cost: Option<f64>) -> Rule {
        let rule = match tv {
            Some(tv) => rule.with_tv(tv),
            None => rule,
        };
        match cost {
            Some(cost) => rule.with_cost(cost),
            None => rule,
        }
    }

    fn into_rule(self) -> RuleResult<Rule> {
        if self.template_name.is_some() || self.template_produce.is_some() {
            return Err(self.error("template keys are only allowed in @meta blocks"));
        }
        let Some(conclusion) = self.produce else {
            return Err(RuleError::Parse {
                rule_name: self.name,
                message: "missing 'produce:' line".into(),
            });
        };
        Ok(Self::finish(
            Rule::new(self.name, self.premises, conclusion),
            self.tv,
            self.cost,
        ))
    }

    fn into_meta(self) -> RuleResult<Rule> {
        if self.produce.is_some() {
            return Err(self.error("@meta blocks produce rules; use 'template-produce:'"));
        }
        let Some(conclusion) = self.template_produce else {
            return Err(RuleError::Parse {
                rule_name: self.name,
                message: "missing 'template-produce:' line".into(),
            });
        };
        let template_name = self
            .template_name
            .unwrap_or_else(|| format!("{}-template", self.name));
        let template = Self::finish(
            Rule::new(template_name, self.template_premises, conclusion),
            self.tv,
            self.cost,
        );
        Ok(Rule::meta(self.name, self.premises, template))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::CONCEPT;

    const RULES: &str = "\
# inheritance rules
@rule deduction
  match: (Inheritance $A $B), (Inheritance $B $C)
  produce: (Inheritance $A $C)
  tv: 0.9 0.6
  cost: 2.5

@rule tag
  ; any concept
  match: $X:Concept
  produce: (Done $X)
";

    #[test]
    fn parses_rule_blocks() {
        let rules = parse_rules(RULES).unwrap();
        assert_eq!(rules.len(), 2);

        let deduction = &rules[0];
        assert_eq!(deduction.name, "deduction");
        assert_eq!(deduction.premises.len(), 2);
        assert_eq!(deduction.cost, 2.5);
        assert_eq!(deduction.tv, TruthValue::new(0.9, 0.6).unwrap());
        assert_eq!(
            deduction.to_string(),
            "deduction: (Inheritance $A $B), (Inheritance $B $C) => (Inheritance $A $C)"
        );

        let tag = &rules[1];
        assert_eq!(tag.premises, vec![Term::typed_var("X", CONCEPT)]);
        assert_eq!(tag.tv, TruthValue::default());
        assert_eq!(tag.cost, 1.0);
    }

    #[test]
    fn parses_meta_blocks() {
        let text = "\
@meta transitive-relations
  match: (Transitive $R)
  template: transitive
  template-match: (Evaluation $R (List $A $B)), (Evaluation $R (List $B $C))
  template-produce: (Evaluation $R (List $A $C))
  tv: 0.8 0.2
";
        let rules = parse_rules(text).unwrap();
        assert_eq!(rules.len(), 1);
        let meta = &rules[0];
        assert!(meta.is_meta());
        let template = meta.template().unwrap();
        assert_eq!(template.name, "transitive");
        assert_eq!(template.premises.len(), 2);
        assert_eq!(template.tv, TruthValue::new(0.8, 0.2).unwrap());
        assert_eq!(meta.tv, TruthValue::default());
    }

    #[test]
    fn missing_production_is_an_error() {
        let err = parse_rules("@rule broken\n  match: $X\n").unwrap_err();
        assert!(matches!(err, RuleError::Parse { ref rule_name, .. } if rule_name == "broken"));
    }

    #[test]
    fn out_of_range_truth_value_is_rejected() {
        let err = parse_rules("@rule r\n  match: $X\n  produce: (Done $X)\n  tv: 1.2 0.5\n")
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidTruthValue { mean, .. } if mean == 1.2));
    }

    #[test]
    fn syntax_errors_name_the_rule() {
        let err = parse_rules("@rule bad\n  match: (Inheritance $A\n  produce: $A\n").unwrap_err();
        assert!(matches!(err, RuleError::Parse { ref rule_name, .. } if rule_name == "bad"));
    }

    #[test]
    fn blocks_without_names_are_rejected() {
        assert!(parse_rules("@rule\n  produce: Concept:a\n").is_err());
        assert!(parse_rules("").unwrap().is_empty());
    }
}
