//! TVM instruction tag to C operator text, grounded verbatim on
//! `original_source/src/Tvm/c-backend/COperators.hpp`'s operator table
//! (precedence numbers kept as the original assigns them: lower binds
//! tighter, matching C's own precedence ladder).

#[derive(Debug, Clone, Copy)]
pub struct BinaryOp {
    pub text: &'static str,
    pub precedence: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct UnaryOp {
    pub text: &'static str,
}

/// Looks up a binary infix C operator for an arithmetic/comparison/
/// bitwise instruction tag (spec.md §6.2's instruction tag list).
pub fn binary_op(tag: &str) -> Option<BinaryOp> {
    let (text, precedence) = match tag {
        "add" => ("+", 6),
        "sub" => ("-", 6),
        "mul" => ("*", 5),
        "div" => ("/", 5),
        "rem" => ("%", 5),
        "shl" => ("<<", 7),
        "shr" => (">>", 7),
        "and" => ("&", 10),
        "or" => ("|", 12),
        "xor" => ("^", 11),
        "cmp_eq" => ("==", 9),
        "cmp_ne" => ("!=", 9),
        "cmp_lt" => ("<", 8),
        "cmp_gt" => (">", 8),
        "cmp_le" => ("<=", 8),
        "cmp_ge" => (">=", 8),
        _ => return None,
    };
    Some(BinaryOp { text, precedence })
}

/// Looks up a prefix C operator for a unary/memory instruction tag.
pub fn unary_op(tag: &str) -> Option<UnaryOp> {
    let text = match tag {
        "load" => "*",
        _ => return None,
    };
    Some(UnaryOp { text })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_every_spec_arithmetic_and_comparison_tag() {
        for tag in ["add", "sub", "mul", "div", "rem", "shl", "shr", "and", "or", "xor", "cmp_eq", "cmp_ne", "cmp_lt", "cmp_gt", "cmp_le", "cmp_ge"] {
            assert!(binary_op(tag).is_some(), "missing mapping for {tag}");
        }
    }

    #[test]
    fn unknown_tag_has_no_binary_mapping() {
        assert!(binary_op("call").is_none());
    }
}
