//! XPath expression helpers.
//!
//! Small builders for the XPath fragments that come up constantly when
//! driving a live document: class-membership predicates, meta tag lookups,
//! and case folding. All of them return plain strings ready to embed in a
//! larger expression.

/// Normalizes an XPath expression for evaluation.
///
/// Leading and trailing whitespace may have been added for readability when
/// the expression was written inline; this strips it.
#[must_use]
pub fn xpath(expr: &str) -> String {
    expr.trim().to_string()
}

/// Builds a predicate testing whether `class_name` occurs as a whole word in
/// the node's `class` attribute.
///
/// # Example
///
/// ```
/// use firefox_repl::xpath::has_class;
///
/// let expr = format!(".//li[ {} ]", has_class("foo"));
/// assert_eq!(
///     expr,
///     ".//li[ contains(concat(' ', @class, ' '), ' foo ') ]"
/// );
/// ```
#[must_use]
pub fn has_class(class_name: &str) -> String {
    format!("contains(concat(' ', @class, ' '), ' {class_name} ')")
}

/// Builds an expression selecting the `content` of the head `meta` element
/// with the given `name` attribute.
///
/// Only `meta` elements in the HTML `head` are examined. With
/// `nocase` the name attribute is compared case-insensitively; the supplied
/// name is always lowercased.
#[must_use]
pub fn meta_value(attr_name: &str, nocase: bool) -> String {
    let name_expr = if nocase {
        down_case("@name")
    } else {
        "@name".to_string()
    };
    xpath(&format!(
        "/html/head/meta[{name_expr}=\"{}\"]/@content",
        attr_name.to_lowercase()
    ))
}

/// Builds an expression translating `expr` to lowercase.
///
/// XPath 1.0 has no lowercase function, so this emits the conventional
/// `translate` alphabet form.
#[must_use]
pub fn down_case(expr: &str) -> String {
    format!("translate({expr},'ABCDEFGHIJKLMNOPQRSTUVWXYZ','abcdefghijklmnopqrstuvwxyz')")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xpath_strips_surrounding_whitespace() {
        assert_eq!(
            xpath(" /html/head/title[@id=\"some_id\"] "),
            "/html/head/title[@id=\"some_id\"]"
        );
        assert_eq!(xpath("//a"), "//a");
    }

    #[test]
    fn test_has_class_predicate() {
        assert_eq!(
            has_class("foo"),
            "contains(concat(' ', @class, ' '), ' foo ')"
        );
    }

    #[test]
    fn test_meta_value() {
        assert_eq!(
            meta_value("Description", false),
            "/html/head/meta[@name=\"description\"]/@content"
        );
    }

    #[test]
    fn test_meta_value_nocase_folds_attribute() {
        let expr = meta_value("description", true);
        assert!(expr.starts_with("/html/head/meta[translate(@name,"));
        assert!(expr.ends_with("=\"description\"]/@content"));
    }

    #[test]
    fn test_down_case_alphabet() {
        assert_eq!(
            down_case("@name"),
            "translate(@name,'ABCDEFGHIJKLMNOPQRSTUVWXYZ','abcdefghijklmnopqrstuvwxyz')"
        );
    }
}
