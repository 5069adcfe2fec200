mod common;

use std::sync::Arc;

use common::{GUID, ScriptedTransport, client};
use dynamics_webapi::{AbortSignal, Operation, Request, WebApiError};
use serde_json::json;

const BATCH_RESPONSE: &str = "--batchresponse_1\r\n\
Content-Type: multipart/mixed; boundary=changesetresponse_2\r\n\
\r\n\
--changesetresponse_2\r\n\
Content-Type: application/http\r\n\
Content-Transfer-Encoding: binary\r\n\
Content-ID: 100001\r\n\
\r\n\
HTTP/1.1 204 No Content\r\n\
OData-Version: 4.0\r\n\
OData-EntityId: https://org.crm.dynamics.com/api/data/v9.2/accounts(00000000-0000-0000-0000-000000000001)\r\n\
\r\n\
\r\n\
--changesetresponse_2\r\n\
Content-Type: application/http\r\n\
Content-Transfer-Encoding: binary\r\n\
Content-ID: 100002\r\n\
\r\n\
HTTP/1.1 204 No Content\r\n\
OData-Version: 4.0\r\n\
\r\n\
\r\n\
--changesetresponse_2--\r\n\
--batchresponse_1\r\n\
Content-Type: application/http\r\n\
Content-Transfer-Encoding: binary\r\n\
\r\n\
HTTP/1.1 200 OK\r\n\
Content-Type: application/json; odata.metadata=minimal\r\n\
OData-Version: 4.0\r\n\
\r\n\
{\"@odata.context\":\"ctx\",\"value\":[{\"fullname\":\"Jane\",\"statecode@OData.Community.Display.V1.FormattedValue\":\"Active\"}]}\r\n\
--batchresponse_1--\r\n";

fn queue_round_trip_requests(client: &dynamics_webapi::DynamicsClient) {
    client.start_batch();
    client
        .enqueue(Operation::Create, &Request::new("Accounts").data(json!({"name": "A"})))
        .unwrap();
    client
        .enqueue(Operation::Update, &Request::reference("$100001").data(json!({"name": "B"})))
        .unwrap();
    client
        .enqueue(Operation::RetrieveMultiple, &Request::new("contacts").select(["fullname"]))
        .unwrap();
}

#[tokio::test]
async fn batch_round_trip_keeps_queue_order() {
    let transport = Arc::new(ScriptedTransport::new().respond(
        200,
        &[("Content-Type", "multipart/mixed; boundary=batchresponse_1")],
        BATCH_RESPONSE,
    ));
    let client = client(transport.clone());
    queue_round_trip_requests(&client);

    let results = client.execute_batch(&Request::default()).await.unwrap();
    assert!(!client.is_batch_open());
    assert_eq!(results.len(), 3);

    assert_eq!(results[0].operation, Operation::Create);
    assert_eq!(results[0].entity_id().as_deref(), Some(GUID));
    assert_eq!(results[1].operation, Operation::Update);
    assert_eq!(results[1].status_code, Some(204));
    assert_eq!(results[1].data, None);

    let listed = results[2].data.as_ref().unwrap();
    assert_eq!(listed["oDataContext"], "ctx");
    assert_eq!(listed["value"][0]["statecode_Formatted"], "Active");

    let sent = &transport.sent()[0];
    assert_eq!(sent.method, "POST");
    assert_eq!(sent.url, "https://org.crm.dynamics.com/api/data/v9.2/$batch");

    let content_type = &sent.headers["Content-Type"];
    let boundary = content_type
        .strip_prefix("multipart/mixed; boundary=")
        .unwrap();
    assert!(boundary.starts_with("dwa_batch_"));

    let body = sent.body.as_deref().unwrap();
    assert!(body.starts_with(&format!("--{}\r\n", boundary)));
    assert!(body.ends_with(&format!("--{}--\r\n", boundary)));
    assert!(body.contains("Content-Type: multipart/mixed; boundary=changeset_"));
    assert!(body.contains("Content-ID: 100001\r\n"));
    assert!(body.contains("Content-ID: 100002\r\n"));
    assert!(body.contains("POST https://org.crm.dynamics.com/api/data/v9.2/accounts HTTP/1.1\r\n"));
    assert!(body.contains("PATCH $100001 HTTP/1.1\r\n"));
    assert!(body.contains("GET https://org.crm.dynamics.com/api/data/v9.2/contacts?$select=fullname HTTP/1.1\r\n"));

    let create = body.find("POST ").unwrap();
    let update = body.find("PATCH ").unwrap();
    let read = body.find("GET ").unwrap();
    assert!(create < update && update < read);
}

#[tokio::test]
async fn batch_options_apply_to_outer_request() {
    let transport = Arc::new(ScriptedTransport::new().respond(
        200,
        &[("Content-Type", "multipart/mixed; boundary=batchresponse_1")],
        BATCH_RESPONSE,
    ));
    let client = client(transport.clone());
    queue_round_trip_requests(&client);

    let mut options = Request::default().impersonate(format!("{{{}}}", GUID));
    options.continue_on_error = true;
    client.execute_batch(&options).await.unwrap();

    let sent = &transport.sent()[0];
    assert_eq!(sent.headers["Prefer"], "odata.continue-on-error");
    assert_eq!(sent.headers["MSCRMCallerID"], GUID);
}

#[tokio::test]
async fn empty_batch_never_reaches_transport() {
    let transport = Arc::new(ScriptedTransport::new());
    let client = client(transport.clone());

    client.start_batch();
    let err = client.execute_batch(&Request::default()).await.unwrap_err();

    assert!(matches!(err, WebApiError::ResponseFormat { .. }));
    assert!(err.to_string().contains("empty batch payload"));
    assert!(transport.sent().is_empty());
    assert!(!client.is_batch_open());
}

#[tokio::test]
async fn enqueue_outside_batch_is_usage_error() {
    let transport = Arc::new(ScriptedTransport::new());
    let client = client(transport);

    let err = client
        .enqueue(Operation::Delete, &Request::new("accounts").key(GUID))
        .unwrap_err();
    assert!(matches!(err, WebApiError::Usage { .. }));
    assert!(err.to_string().contains("start_batch()"));
}

#[tokio::test]
async fn aborted_batch_discards_response() {
    let transport = Arc::new(ScriptedTransport::new().respond(200, &[], "garbage that is not multipart"));
    let client = client(transport.clone());
    queue_round_trip_requests(&client);

    let signal = AbortSignal::new();
    signal.abort();
    let err = client
        .execute_batch(&Request::default().signal(signal))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some("ABORT_ERR"));
    assert!(transport.sent().is_empty());
    assert!(!client.is_batch_open());
}

#[tokio::test]
async fn failed_batch_is_protocol_error() {
    let body = r#"{"error":{"code":"0x0","message":"bad batch"}}"#;
    let transport = Arc::new(ScriptedTransport::new().respond(400, &[], body));
    let client = client(transport);
    queue_round_trip_requests(&client);

    let err = client.execute_batch(&Request::default()).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
}
