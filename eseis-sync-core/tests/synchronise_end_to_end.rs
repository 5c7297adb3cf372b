use std::path::Path;
use std::time::{Duration, SystemTime};

use eseis_sync_core::config::Credentials;
use eseis_sync_core::contract::{MockBrowser, MockEseisApi};
use eseis_sync_core::error::{ErrorPolicy, SyncError};
use eseis_sync_core::model::{Contract, Document, Folder, Report};
use eseis_sync_core::snapshot::{LoginFlow, SnapshotSession};
use eseis_sync_core::synchronise::{SynchroniseSettings, Synchroniser};
use mockall::predicate::eq;
use tempfile::tempdir;

const T0: &str = "2023-01-10T09:00:00Z";

fn settings(output_dir: &Path, policy: ErrorPolicy) -> SynchroniseSettings {
    SynchroniseSettings {
        output_dir: output_dir.to_path_buf(),
        sergic_offer: "ESE".to_string(),
        on_item_error: policy,
    }
}

fn contract() -> Contract {
    serde_json::from_value(serde_json::json!({
        "id": 11, "display_name": "Appartement 4", "place_id": 77
    }))
    .unwrap()
}

fn folder() -> Folder {
    serde_json::from_value(serde_json::json!({"id": 3, "display_name": "Assemblées"})).unwrap()
}

fn document(id: i64, uuid: &str, name: &str) -> Document {
    serde_json::from_value(serde_json::json!({
        "id": id, "uuid": uuid, "display_name": name, "updated_at": T0
    }))
    .unwrap()
}

fn report() -> Report {
    serde_json::from_value(serde_json::json!({
        "id": 501,
        "display_name": "Porte de garage",
        "state": "acknowledged",
        "created_at": "2023-02-01T08:30:00Z",
        "updated_at": T0
    }))
    .unwrap()
}

/// An account with one contract, one individual folder holding `documents`,
/// and every other section empty.
fn account(documents: Vec<Document>) -> MockEseisApi {
    let mut api = MockEseisApi::new();
    api.expect_contracts()
        .with(eq("ESE"))
        .returning(|_| Ok(vec![contract()]));
    api.expect_contract_folders()
        .returning(|_, page| Ok(if page == 1 { vec![folder()] } else { vec![] }));
    api.expect_contract_documents()
        .with(eq(11), eq(3), mockall::predicate::always())
        .returning(move |_, _, page| Ok(if page == 1 { documents.clone() } else { vec![] }));
    api.expect_coownership_folders().returning(|_, _| Ok(vec![]));
    api.expect_maintenance_contract_categories()
        .returning(|_| Ok(vec![]));
    api.expect_forum_topics().returning(|_, _| Ok(vec![]));
    api.expect_fiscal_years().returning(|_| Ok(vec![]));
    api
}

fn folder_dir(out: &Path) -> std::path::PathBuf {
    out.join("Appartement 4").join("individual").join("Assemblées")
}

#[tokio::test]
async fn only_new_documents_are_fetched() {
    let out = tempdir().unwrap();
    // Doc B was downloaded by an earlier run, after its remote update.
    std::fs::create_dir_all(folder_dir(out.path())).unwrap();
    let doc_b_path = folder_dir(out.path()).join("Doc B.pdf");
    std::fs::write(&doc_b_path, b"previously downloaded").unwrap();
    let doc_b_modified = std::fs::metadata(&doc_b_path).unwrap().modified().unwrap();

    let mut api = account(vec![
        document(1, "uuid-a", "Doc A"),
        document(2, "uuid-b", "Doc B"),
    ]);
    api.expect_reports().returning(|_, _| Ok(vec![]));
    api.expect_document()
        .with(eq("uuid-a"))
        .times(1)
        .returning(|_| Ok(b"%PDF-A".to_vec()));

    let mut sync: Synchroniser<_, MockBrowser> =
        Synchroniser::new(api, settings(out.path(), ErrorPolicy::Abort));
    let report = sync.run().await.unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        std::fs::read(folder_dir(out.path()).join("Doc A.pdf")).unwrap(),
        b"%PDF-A"
    );
    assert_eq!(std::fs::read(&doc_b_path).unwrap(), b"previously downloaded");
    assert_eq!(
        std::fs::metadata(&doc_b_path).unwrap().modified().unwrap(),
        doc_b_modified
    );
}

#[tokio::test]
async fn second_run_transfers_nothing() {
    let out = tempdir().unwrap();

    let mut first = account(vec![document(1, "uuid-a", "Doc A")]);
    first.expect_reports().returning(|_, _| Ok(vec![]));
    first.expect_document().times(1).returning(|_| Ok(b"%PDF".to_vec()));
    let mut sync: Synchroniser<_, MockBrowser> =
        Synchroniser::new(first, settings(out.path(), ErrorPolicy::Abort));
    sync.run().await.unwrap();

    let mut second = account(vec![document(1, "uuid-a", "Doc A")]);
    second.expect_reports().returning(|_, _| Ok(vec![]));
    second.expect_document().times(0);
    let mut sync: Synchroniser<_, MockBrowser> =
        Synchroniser::new(second, settings(out.path(), ErrorPolicy::Abort));
    let report = sync.run().await.unwrap();

    assert_eq!(report.created, 0);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn skip_policy_records_a_failed_document_and_keeps_going() {
    let out = tempdir().unwrap();
    let mut api = account(vec![
        document(1, "uuid-broken", "Broken"),
        document(2, "uuid-ok", "Fine"),
    ]);
    api.expect_reports().returning(|_, _| Ok(vec![]));
    api.expect_document()
        .with(eq("uuid-broken"))
        .returning(|_| Err(SyncError::transport("/v1/sergic_documents", "status 500")));
    api.expect_document()
        .with(eq("uuid-ok"))
        .returning(|_| Ok(b"%PDF".to_vec()));

    let mut sync: Synchroniser<_, MockBrowser> =
        Synchroniser::new(api, settings(out.path(), ErrorPolicy::SkipItem));
    let report = sync.run().await.unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].scope, "document 1 (Broken)");
    assert!(!folder_dir(out.path()).join("Broken.pdf").exists());
    assert!(folder_dir(out.path()).join("Fine.pdf").exists());
}

fn logged_in_browser(pdf: &'static [u8]) -> MockBrowser {
    let mut browser = MockBrowser::new();
    browser.expect_set_viewport().returning(|_, _| Ok(()));
    browser.expect_navigate().returning(|_| Ok(()));
    browser.expect_wait_ready().returning(|_| Ok(()));
    browser.expect_submit_text().returning(|_, _| Ok(()));
    browser.expect_remove_element().returning(|_| Ok(()));
    browser.expect_clear_padding_left().returning(|_| Ok(()));
    browser
        .expect_print_to_pdf()
        .times(1)
        .returning(move || Ok(pdf.to_vec()));
    browser.expect_close().times(1).returning(|| Ok(()));
    browser
}

#[tokio::test]
async fn reports_are_captured_once_into_their_state_bucket() {
    let out = tempdir().unwrap();
    let mut session = SnapshotSession::new(logged_in_browser(b"%PDF-report"));
    session
        .login(&LoginFlow {
            web_root: "https://web.example".to_string(),
            credentials: Credentials {
                username: "jane".to_string(),
                password: "secret".to_string(),
            },
        })
        .await
        .unwrap();

    let mut api = account(vec![]);
    api.expect_reports()
        .returning(|_, page| Ok(if page == 1 { vec![report()] } else { vec![] }));
    api.expect_report_page_url()
        .with(eq(501))
        .returning(|id| format!("https://web.example/mes-echanges/signalements/{id}"));

    let mut sync = Synchroniser::new(api, settings(out.path(), ErrorPolicy::Abort))
        .with_snapshots(session);
    let first = sync.run().await.unwrap();
    // The PDF now postdates the report's update: no second capture.
    let second = sync.run().await.unwrap();
    sync.close().await.unwrap();

    let bucket = out.path().join("Appartement 4").join("reports").join("acknowledged");
    assert_eq!(
        std::fs::read(bucket.join("2023_2_1__501__Porte de garage.pdf")).unwrap(),
        b"%PDF-report"
    );
    assert!(bucket.join("2023_2_1__501__Porte de garage.json").exists());
    assert_eq!(first.snapshots, 1);
    assert_eq!(first.created, 0);
    assert_eq!(second.snapshots, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.metadata_files, 1);
}

#[tokio::test]
async fn stale_local_file_is_refetched_when_remote_is_newer() {
    let out = tempdir().unwrap();
    std::fs::create_dir_all(folder_dir(out.path())).unwrap();
    let path = folder_dir(out.path()).join("Doc A.pdf");
    std::fs::write(&path, b"old").unwrap();
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000))
        .unwrap();

    let mut api = account(vec![document(1, "uuid-a", "Doc A")]);
    api.expect_reports().returning(|_, _| Ok(vec![]));
    api.expect_document().times(1).returning(|_| Ok(b"new".to_vec()));

    let mut sync: Synchroniser<_, MockBrowser> =
        Synchroniser::new(api, settings(out.path(), ErrorPolicy::Abort));
    let report = sync.run().await.unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(std::fs::read(&path).unwrap(), b"new");
}

/// An account with one contract whose folder sections are empty. Callers
/// set up maintenance, reports, forum and budgets.
fn bare_account() -> MockEseisApi {
    let mut api = MockEseisApi::new();
    api.expect_contracts().returning(|_| Ok(vec![contract()]));
    api.expect_contract_folders().returning(|_, _| Ok(vec![]));
    api.expect_coownership_folders().returning(|_, _| Ok(vec![]));
    api
}

fn contract_dir(out: &Path) -> std::path::PathBuf {
    out.join("Appartement 4")
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn forum_topic_is_mirrored_with_posts_attachments_and_snapshot() {
    let out = tempdir().unwrap();
    let mut session = SnapshotSession::new(logged_in_browser(b"%PDF-topic"));
    session
        .login(&LoginFlow {
            web_root: "https://web.example".to_string(),
            credentials: Credentials {
                username: "jane".to_string(),
                password: "secret".to_string(),
            },
        })
        .await
        .unwrap();

    let mut api = bare_account();
    api.expect_maintenance_contract_categories()
        .returning(|_| Ok(vec![]));
    api.expect_reports().returning(|_, _| Ok(vec![]));
    api.expect_fiscal_years().returning(|_| Ok(vec![]));
    api.expect_forum_topics()
        .with(eq(77), mockall::predicate::always())
        .returning(|_, page| {
            if page > 1 {
                return Ok(vec![]);
            }
            Ok(vec![serde_json::from_value(serde_json::json!({
                "id": 40,
                "display_name": "Travaux / toiture",
                "created_at": "2023-03-07T23:30:00-02:00",
                "updated_at": T0,
                "attachments": [{
                    "id": 1, "source_file_name": "devis", "source_content_type": "application/pdf",
                    "file_url": "https://files.example/1", "source_updated_at": T0
                }]
            }))
            .unwrap()])
        });
    api.expect_topic_posts()
        .with(eq(77), eq(40), mockall::predicate::always())
        .returning(|_, _, page| {
            let post = match page {
                1 => serde_json::json!({"id": 100, "body": "Photo jointe", "attachments": [{
                    "id": 2, "source_file_name": "photo", "source_content_type": "image/jpeg",
                    "file_url": "https://files.example/2", "source_updated_at": T0
                }]}),
                2 => serde_json::json!({"id": 101, "attachments": [{
                    "id": 3, "source_file_name": "plan", "source_content_type": "image/png",
                    "file_url": "https://files.example/3", "source_updated_at": null
                }]}),
                _ => return Ok(vec![]),
            };
            Ok(vec![serde_json::from_value(post).unwrap()])
        });
    api.expect_attachment()
        .times(3)
        .returning(|url| Ok(format!("bytes of {url}").into_bytes()));
    api.expect_forum_topic_page_url()
        .with(eq(40))
        .returning(|id| format!("https://web.example/mes-echanges/forum/{id}"));

    let mut sync = Synchroniser::new(api, settings(out.path(), ErrorPolicy::Abort))
        .with_snapshots(session);
    let report = sync.run().await.unwrap();
    sync.close().await.unwrap();

    // Created late on the 7th at -02:00, which is the 8th in UTC.
    let topic_dir = contract_dir(out.path())
        .join("forum")
        .join("2023_3_8__40__Travaux _ toiture");
    let topic = read_json(&topic_dir.join("topic.json"));
    assert_eq!(topic["created_at"], "2023-03-07T23:30:00-02:00");
    let posts = read_json(&topic_dir.join("posts.json"));
    let ids: Vec<_> = posts
        .as_array()
        .unwrap()
        .iter()
        .map(|post| post["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![100, 101]);
    assert_eq!(posts[0]["body"], "Photo jointe");

    assert_eq!(
        std::fs::read(topic_dir.join("devis.pdf")).unwrap(),
        b"bytes of https://files.example/1"
    );
    assert!(topic_dir.join("photo.jpg").exists());
    assert!(topic_dir.join("plan.png").exists());
    assert_eq!(std::fs::read(topic_dir.join("topic.pdf")).unwrap(), b"%PDF-topic");
    assert_eq!(report.created, 3);
    assert_eq!(report.snapshots, 1);
    assert_eq!(report.metadata_files, 2);
}

#[tokio::test]
async fn budgets_mirror_fiscal_years_budgets_and_ledger_entries() {
    let out = tempdir().unwrap();
    let mut api = bare_account();
    api.expect_maintenance_contract_categories()
        .returning(|_| Ok(vec![]));
    api.expect_reports().returning(|_, _| Ok(vec![]));
    api.expect_forum_topics().returning(|_, _| Ok(vec![]));
    api.expect_fiscal_years().with(eq(77)).returning(|_| {
        Ok(vec![serde_json::from_value(serde_json::json!({
            "id": 5, "display_name": "Exercice 2022/2023", "closed": false
        }))
        .unwrap()])
    });
    api.expect_budgets().with(eq(77), eq(5)).returning(|_, _| {
        Ok(vec![serde_json::from_value(serde_json::json!({
            "id": 6, "display_name": "Charges courantes"
        }))
        .unwrap()])
    });
    api.expect_account_place_entries().with(eq(6)).returning(|_| {
        Ok(vec![serde_json::from_value(serde_json::json!({
            "id": 7,
            "uuid": "uuid-ledger",
            "display_name": "EDF",
            "amount": -12050,
            "operation_date": "2022-11-30T00:00:00+01:00",
            "updated_at": T0
        }))
        .unwrap()])
    });
    api.expect_document()
        .with(eq("uuid-ledger"))
        .times(1)
        .returning(|_| Ok(b"%PDF-ledger".to_vec()));

    let mut sync: Synchroniser<_, MockBrowser> =
        Synchroniser::new(api, settings(out.path(), ErrorPolicy::Abort));
    let report = sync.run().await.unwrap();

    let fiscal_year_dir = contract_dir(out.path())
        .join("budgets")
        .join("Exercice 2022_2023");
    assert_eq!(read_json(&fiscal_year_dir.join("info.json"))["closed"], false);
    let budget_dir = fiscal_year_dir.join("Charges courantes");
    assert_eq!(read_json(&budget_dir.join("info.json"))["id"], 6);

    let stem = "2022-11-29T23:00:00Z_-12050_EDF";
    let entry = read_json(&budget_dir.join(format!("{stem}.json")));
    assert_eq!(entry["operation_date"], "2022-11-30T00:00:00+01:00");
    assert_eq!(
        std::fs::read(budget_dir.join(format!("{stem}.pdf"))).unwrap(),
        b"%PDF-ledger"
    );
    assert_eq!(report.created, 1);
    assert_eq!(report.metadata_files, 3);
}

#[tokio::test]
async fn maintenance_contracts_get_info_and_documents() {
    let out = tempdir().unwrap();
    let mut api = bare_account();
    api.expect_reports().returning(|_, _| Ok(vec![]));
    api.expect_forum_topics().returning(|_, _| Ok(vec![]));
    api.expect_fiscal_years().returning(|_| Ok(vec![]));
    api.expect_maintenance_contract_categories()
        .with(eq(77))
        .returning(|_| {
            Ok(vec![serde_json::from_value(serde_json::json!({
                "id": 1,
                "display_name": "Ascenseur",
                "maintenance_contracts": [{"id": 30, "reference": "C-12", "company_name": "Otis"}]
            }))
            .unwrap()])
        });
    api.expect_maintenance_contract().with(eq(30)).returning(|_| {
        Ok(serde_json::from_value(serde_json::json!({
            "id": 30,
            "reference": "C-12",
            "company_name": "Otis",
            "renewal": "tacit",
            "maintenance_contract_documents": [
                {"id": 31, "uuid": "uuid-m", "display_name": "Contrat", "updated_at": T0}
            ]
        }))
        .unwrap())
    });
    api.expect_document()
        .with(eq("uuid-m"))
        .times(1)
        .returning(|_| Ok(b"%PDF-contrat".to_vec()));

    let mut sync: Synchroniser<_, MockBrowser> =
        Synchroniser::new(api, settings(out.path(), ErrorPolicy::Abort));
    let report = sync.run().await.unwrap();

    let maintenance_dir = contract_dir(out.path())
        .join("maintenance")
        .join("Ascenseur")
        .join("Otis_C-12");
    assert_eq!(read_json(&maintenance_dir.join("info.json"))["renewal"], "tacit");
    assert_eq!(
        std::fs::read(maintenance_dir.join("Contrat.pdf")).unwrap(),
        b"%PDF-contrat"
    );
    assert_eq!(report.created, 1);
    assert_eq!(report.metadata_files, 1);
}
