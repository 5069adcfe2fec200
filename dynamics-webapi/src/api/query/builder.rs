//! Path and query-string composition for a request descriptor

use crate::api::models::Request;

use super::expand::render_expand;
use super::filters::{encode_component, render_filter};
use super::function::render_function;

/// Composed relative path plus ordered query entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposedQuery {
    pub path: String,
    pub params: Vec<String>,
}

impl ComposedQuery {
    /// Append `/segment` to the path
    pub fn push_segment(&mut self, segment: &str) {
        if !self.path.is_empty() {
            self.path.push('/');
        }
        self.path.push_str(segment);
    }

    /// `path` or `path?a&b`, never a dangling `?`
    pub fn to_path_and_query(&self) -> String {
        if self.params.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.params.join("&"))
        }
    }
}

/// Compose the path and query for `request` on top of `base`
///
/// `base` already holds the collection and key segment. Path clauses are
/// applied first (property or field name, navigation property, a navigation
/// path carried by `select`, function call), then query entries in a fixed
/// order: function aliases, `$select`, `$top` or `$count`, `$orderby`,
/// `$filter`, `$expand`, `savedQuery`, `userQuery`, `partitionid`,
/// `fetchXml`, raw parameters.
pub fn compose(base: &str, request: &Request) -> ComposedQuery {
    let mut composed = ComposedQuery {
        path: base.to_string(),
        params: Vec::new(),
    };

    if let Some(segment) = request
        .property
        .as_deref()
        .or(request.field_name.as_deref())
        .filter(|s| !s.is_empty())
    {
        composed.push_segment(segment);
    }

    let navigation = request.navigation_property.as_deref().filter(|s| !s.is_empty());
    if let Some(navigation) = navigation {
        composed.push_segment(navigation);
    }

    let mut select: &[String] = &request.select;
    if let Some(first) = select.first() {
        if first.starts_with('/') {
            if navigation.is_none() {
                composed.path.push_str(first);
            }
            select = &select[1..];
        } else if select.len() == 1 && first.ends_with("/$ref") {
            composed.push_segment(first);
            select = &[];
        }
    }

    if let Some(name) = request.function_name.as_deref().filter(|s| !s.is_empty()) {
        let (segment, aliases) = render_function(name, &request.function_parameters);
        composed.push_segment(&segment);
        composed.params.extend(aliases);
    }

    if !select.is_empty() {
        composed.params.push(format!("$select={}", select.join(",")));
    }

    match request.top {
        Some(top) if top > 0 => composed.params.push(format!("$top={}", top)),
        _ if request.count => composed.params.push("$count=true".to_string()),
        _ => {}
    }

    if !request.order_by.is_empty() {
        composed.params.push(format!("$orderby={}", request.order_by.join(",")));
    }

    if let Some(filter) = request.filter.as_deref().filter(|f| !f.is_empty()) {
        composed.params.push(format!("$filter={}", render_filter(filter)));
    }

    if let Some(expand) = render_expand(&request.expand) {
        composed.params.push(format!("$expand={}", expand));
    }

    if let Some(saved_query) = request.saved_query.as_deref().filter(|s| !s.is_empty()) {
        composed.params.push(format!("savedQuery={}", saved_query));
    }
    if let Some(user_query) = request.user_query.as_deref().filter(|s| !s.is_empty()) {
        composed.params.push(format!("userQuery={}", user_query));
    }
    if let Some(partition_id) = request.partition_id.as_deref().filter(|s| !s.is_empty()) {
        composed.params.push(format!("partitionid='{}'", partition_id));
    }
    if let Some(fetch_xml) = request.fetch_xml.as_deref().filter(|s| !s.is_empty()) {
        composed.params.push(format!("fetchXml={}", encode_component(fetch_xml)));
    }

    composed.params.extend(request.query_params.iter().cloned());
    composed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::Expand;
    use serde_json::json;

    fn url(base: &str, request: &Request) -> String {
        compose(base, request).to_path_and_query()
    }

    #[test]
    fn test_select_only() {
        let request = Request::new("accounts").select(["a", "b"]);
        assert_eq!(url("accounts", &request), "accounts?$select=a,b");
    }

    #[test]
    fn test_no_params_no_question_mark() {
        assert_eq!(url("accounts", &Request::new("accounts")), "accounts");
    }

    #[test]
    fn test_fixed_clause_order() {
        let mut request = Request::new("accounts")
            .select(["name"])
            .expand(Expand::new("primarycontactid").select(["fullname"]))
            .filter("statecode eq 0")
            .order_by(["name asc", "createdon desc"])
            .top(3);
        request.saved_query = Some("00000000-0000-0000-0000-000000000009".to_string());
        request.partition_id = Some("p1".to_string());
        request.query_params = vec!["tag=x".to_string()];

        assert_eq!(
            url("accounts", &request),
            "accounts?$select=name&$top=3&$orderby=name asc,createdon desc&$filter=statecode%20eq%200&$expand=primarycontactid($select=fullname)&savedQuery=00000000-0000-0000-0000-000000000009&partitionid='p1'&tag=x"
        );
    }

    #[test]
    fn test_top_wins_over_count() {
        let mut request = Request::new("accounts").top(5);
        request.count = true;
        assert_eq!(url("accounts", &request), "accounts?$top=5");

        request.top = Some(0);
        assert_eq!(url("accounts", &request), "accounts?$count=true");
    }

    #[test]
    fn test_filter_guid_normalized_and_encoded() {
        let request = Request::new("contacts")
            .filter("_parentcustomerid_value eq {00000000-0000-0000-0000-000000000001}");
        assert_eq!(
            url("contacts", &request),
            "contacts?$filter=_parentcustomerid_value%20eq%2000000000-0000-0000-0000-000000000001"
        );
    }

    #[test]
    fn test_property_wins_over_field_name() {
        let mut request = Request::new("accounts");
        request.field_name = Some("telephone1".to_string());
        assert_eq!(url("accounts(1)", &request), "accounts(1)/telephone1");

        request.property = Some("name".to_string());
        assert_eq!(url("accounts(1)", &request), "accounts(1)/name");
    }

    #[test]
    fn test_navigation_then_select() {
        let request = Request::new("accounts")
            .navigation_property("contact_customer_accounts")
            .select(["fullname"]);
        assert_eq!(
            url("accounts(1)", &request),
            "accounts(1)/contact_customer_accounts?$select=fullname"
        );
    }

    #[test]
    fn test_select_navigation_forms() {
        let request = Request::new("accounts").select(["/primarycontactid", "fullname"]);
        assert_eq!(
            url("accounts(1)", &request),
            "accounts(1)/primarycontactid?$select=fullname"
        );

        let request = Request::new("accounts").select(["/primarycontactid/$ref"]);
        assert_eq!(url("accounts(1)", &request), "accounts(1)/primarycontactid/$ref");

        let request = Request::new("accounts").select(["primarycontactid/$ref"]);
        assert_eq!(url("accounts(1)", &request), "accounts(1)/primarycontactid/$ref");
    }

    #[test]
    fn test_select_navigation_dropped_when_navigation_property_set() {
        let request = Request::new("accounts")
            .navigation_property("contact_customer_accounts")
            .select(["/ignored", "fullname"]);
        assert_eq!(
            url("accounts(1)", &request),
            "accounts(1)/contact_customer_accounts?$select=fullname"
        );
    }

    #[test]
    fn test_bound_function_aliases_first() {
        let request = Request::new("systemusers")
            .function(
                "Microsoft.Dynamics.CRM.RetrieveUserPrivileges",
                vec![("Depth".to_string(), json!(1))],
            )
            .select(["name"]);
        assert_eq!(
            url("systemusers(1)", &request),
            "systemusers(1)/Microsoft.Dynamics.CRM.RetrieveUserPrivileges(Depth=@p1)?@p1=1&$select=name"
        );
    }

    #[test]
    fn test_fetch_xml_is_encoded() {
        let request = Request::new("accounts").fetch_xml("<fetch><entity name=\"account\"/></fetch>");
        assert_eq!(
            url("accounts", &request),
            "accounts?fetchXml=%3Cfetch%3E%3Centity%20name%3D%22account%22%2F%3E%3C%2Ffetch%3E"
        );
    }

    #[test]
    fn test_deterministic_for_equal_input() {
        let request = Request::new("accounts").select(["a"]).filter("x eq 1").top(1);
        assert_eq!(url("accounts", &request), url("accounts", &request.clone()));
    }
}
