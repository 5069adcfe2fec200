//! Wire-level names shared by the composers, the batch codec and the parser

/// Header names produced by the header composer
pub mod headers {
    pub const PREFER: &str = "Prefer";
    pub const IF_MATCH: &str = "If-Match";
    pub const IF_NONE_MATCH: &str = "If-None-Match";
    pub const CALLER_ID: &str = "MSCRMCallerID";
    pub const CALLER_OBJECT_ID: &str = "CallerObjectId";
    pub const MERGE_LABELS: &str = "MSCRM.MergeLabels";
    pub const SUPPRESS_DUPLICATE_DETECTION: &str = "MSCRM.SuppressDuplicateDetection";
    pub const BYPASS_CUSTOM_PLUGIN_EXECUTION: &str = "MSCRM.BypassCustomPluginExecution";
    pub const BYPASS_BUSINESS_LOGIC_EXECUTION: &str = "MSCRM.BypassBusinessLogicExecution";
    pub const BYPASS_BUSINESS_LOGIC_STEP_IDS: &str = "MSCRM.BypassBusinessLogicExecutionStepIds";
    pub const SUPPRESS_CALLBACK_EXPANDER_JOB: &str = "MSCRM.SuppressCallbackRegistrationExpanderJob";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_ID: &str = "Content-ID";
    pub const ACCEPT: &str = "Accept";
    pub const ODATA_MAX_VERSION: &str = "OData-MaxVersion";
    pub const ODATA_VERSION: &str = "OData-Version";
    /// Response header carrying the URL of a created entity (lower-cased, as responses are normalized)
    pub const ODATA_ENTITY_ID: &str = "odata-entityid";
}

/// Annotation suffixes consumed by the response parser
pub mod annotations {
    pub const CONTEXT: &str = "odata.context";
    pub const NEXT_LINK: &str = "odata.nextLink";
    pub const COUNT: &str = "odata.count";
    pub const DELTA_LINK: &str = "odata.deltaLink";
    pub const ID: &str = "odata.id";
    pub const FORMATTED_VALUE: &str = "OData.Community.Display.V1.FormattedValue";
    pub const NAVIGATION_PROPERTY: &str = "Microsoft.Dynamics.CRM.associatednavigationproperty";
    pub const LOOKUP_LOGICAL_NAME: &str = "Microsoft.Dynamics.CRM.lookuplogicalname";
    pub const FETCHXML_PAGING_COOKIE: &str = "Microsoft.Dynamics.CRM.fetchxmlpagingcookie";
}

/// Encoded `.` separating a link-entity alias from its attribute in FetchXml results
pub const ALIAS_SEPARATOR: &str = "_x002e_";

/// First auto-assigned Content-ID inside a changeset
pub const AUTO_CONTENT_ID_START: u64 = 100_001;

/// Longest partition id accepted for elastic tables
pub const MAX_PARTITION_ID_LENGTH: usize = 1024;

/// System collections whose names are case sensitive and must not be lower-cased
pub const CASE_SENSITIVE_COLLECTIONS: &[&str] = &[
    "EntityDefinitions",
    "$metadata",
    "RelationshipDefinitions",
    "GlobalOptionSetDefinitions",
    "ManagedPropertyDefinitions",
];

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const JSON_BODY_CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub const HTTP_PART_CONTENT_TYPE: &str = "application/http";
