//! End-to-end tests for PCloudSdk against a mocked pCloud API.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use pcloud_sdk::{
    AuthType, ClientConfig, Credential, Location, PCloudError, PCloudSdk, ProgressExtras,
    TokenStore, TransferStatus,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const MIB: usize = 1024 * 1024;

fn test_config(server: &ServerGuard, token_file: &Path) -> ClientConfig {
    ClientConfig::default()
        .with_api_base_url(server.url())
        .with_retry_base_delay(Duration::from_millis(1))
        .with_token_file(token_file)
}

fn token_path(dir: &TempDir) -> PathBuf {
    dir.path().join(".pcloud_credentials")
}

fn token_store(dir: &TempDir) -> TokenStore {
    TokenStore::new(token_path(dir), 30).unwrap()
}

fn new_sdk(server: &ServerGuard, dir: &TempDir) -> PCloudSdk {
    PCloudSdk::new(test_config(server, &token_path(dir))).unwrap()
}

/// SDK already holding a direct-auth token `tok`.
fn logged_in_sdk(server: &ServerGuard, dir: &TempDir) -> PCloudSdk {
    let mut sdk = new_sdk(server, dir);
    sdk.set_access_token("tok", AuthType::Direct, None);
    sdk
}

type Event = (u64, u64, f64, TransferStatus);

fn assert_monotonic(events: &[Event]) {
    for pair in events.windows(2) {
        assert!(pair[1].0 >= pair[0].0, "bytes went backwards: {:?}", events);
    }
}

mod authentication {
    use super::*;

    #[tokio::test]
    async fn test_login_without_credentials_or_saved_token() {
        let mut server = Server::new_async().await;
        let any = server
            .mock("GET", Matcher::Any)
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        let mut sdk = new_sdk(&server, &dir);
        let err = sdk.login(None, None, false).await.unwrap_err();

        assert!(matches!(err, PCloudError::Authentication(_)));
        assert!(!sdk.is_authenticated());
        any.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_saved_token_requires_credentials() {
        let mut server = Server::new_async().await;
        let any = server
            .mock("GET", Matcher::Any)
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        let mut credential =
            Credential::new("old", AuthType::Direct, Location::Us, "me@example.com");
        credential.saved_at = chrono::Utc::now() - chrono::Duration::days(30);
        token_store(&dir).save(&credential).unwrap();

        let mut sdk = new_sdk(&server, &dir);
        assert!(!sdk.is_authenticated());

        let err = sdk.login(None, None, false).await.unwrap_err();
        assert!(matches!(err, PCloudError::Authentication(_)));
        any.assert_async().await;
    }

    #[tokio::test]
    async fn test_direct_login_persists_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/userinfo")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("getauth".into(), "1".into()),
                Matcher::UrlEncoded("username".into(), "me@example.com".into()),
                Matcher::UrlEncoded("password".into(), "hunter2".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"result": 0, "auth": "AUTHTOKEN", "userid": 7, "email": "me@example.com",
                    "quota": 1000, "usedquota": 250}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        let mut sdk = new_sdk(&server, &dir);
        let info = sdk
            .login(Some("me@example.com"), Some("hunter2"), false)
            .await
            .unwrap();

        assert_eq!(info.access_token, "AUTHTOKEN");
        assert_eq!(info.auth_type, AuthType::Direct);
        assert!(!info.reused);
        assert!(sdk.is_authenticated());

        let saved = token_store(&dir).load().unwrap().unwrap();
        assert_eq!(saved.access_token, "AUTHTOKEN");
        assert_eq!(saved.email, "me@example.com");
        assert_eq!(sdk.saved_email().as_deref(), Some("me@example.com"));

        // Cached from the login response; no further request.
        assert_eq!(sdk.user().get_free_quota().await.unwrap(), 750);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_login() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/userinfo")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"result": 2000, "error": "Log in failed."}"#)
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        let mut sdk = new_sdk(&server, &dir);
        let err = sdk
            .login(Some("me@example.com"), Some("wrong"), false)
            .await
            .unwrap_err();

        assert!(matches!(err, PCloudError::Authentication(_)));
        assert!(!token_path(&dir).exists());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_saved_token_is_reused() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/userinfo")
            .match_query(Matcher::UrlEncoded("auth".into(), "saved".into()))
            .with_status(200)
            .with_body(r#"{"result": 0, "userid": 7, "email": "me@example.com"}"#)
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        token_store(&dir)
            .save(&Credential::new(
                "saved",
                AuthType::Direct,
                Location::Eu,
                "me@example.com",
            ))
            .unwrap();

        let mut sdk = new_sdk(&server, &dir);
        assert!(sdk.is_authenticated());

        let info = sdk.login(None, None, false).await.unwrap();
        assert!(info.reused);
        assert_eq!(info.location, Location::Eu);
        assert_eq!(info.access_token, "saved");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_oauth2_code_exchange() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("GET", "/oauth2_token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("client_id".into(), "app".into()),
                Matcher::UrlEncoded("client_secret".into(), "shh".into()),
                Matcher::UrlEncoded("code".into(), "CODE42".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"result": 0, "access_token": "OAT", "locationid": 2, "userid": 7}"#)
            .expect(1)
            .create_async()
            .await;
        let userinfo = server
            .mock("GET", "/userinfo")
            .match_query(Matcher::UrlEncoded("access_token".into(), "OAT".into()))
            .with_status(200)
            .with_body(r#"{"result": 0, "userid": 7, "email": "oauth@example.com"}"#)
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        let config = test_config(&server, &token_path(&dir))
            .with_app_credentials("app", "shh");
        let mut sdk = PCloudSdk::new(config).unwrap();
        let info = sdk.authenticate("CODE42", None).await.unwrap();

        assert_eq!(info.email, "oauth@example.com");
        assert_eq!(info.location, Location::Eu);
        assert_eq!(info.auth_type, AuthType::Oauth2);

        let creds = sdk.credentials_info();
        assert!(creds.authenticated);
        assert_eq!(creds.location_id, Some(2));
        assert_eq!(creds.auth_type, Some(AuthType::Oauth2));

        let saved = token_store(&dir).load().unwrap().unwrap();
        assert_eq!(saved.token_type, AuthType::Oauth2);
        assert_eq!(saved.email, "oauth@example.com");
        token.assert_async().await;
        userinfo.assert_async().await;
    }

    #[tokio::test]
    async fn test_unwritable_token_file_fails_login() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/userinfo")
            .match_query(Matcher::UrlEncoded("getauth".into(), "1".into()))
            .with_status(200)
            .with_body(
                r#"{"result": 0, "auth": "AUTHTOKEN", "userid": 7, "email": "me@example.com"}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        // A regular file where the token file's directory should be.
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();

        let config = test_config(&server, &blocker.join("creds"));
        let mut sdk = PCloudSdk::new(config).unwrap();
        let err = sdk
            .login(Some("me@example.com"), Some("hunter2"), false)
            .await
            .unwrap_err();

        assert!(matches!(err, PCloudError::LocalIo { .. }));
        assert!(!sdk.is_authenticated());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_out_of_range_token_ttl_is_rejected() {
        let server = Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let config = test_config(&server, &token_path(&dir))
            .with_token_ttl_days(i64::MAX);

        let result = PCloudSdk::new(config);
        assert!(matches!(result, Err(PCloudError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_oauth2_requires_app_credentials() {
        let server = Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let mut sdk = new_sdk(&server, &dir);

        let err = sdk.authenticate("CODE42", None).await.unwrap_err();
        assert!(matches!(err, PCloudError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_logout_removes_token_file() {
        let server = Server::new_async().await;
        let dir = TempDir::new().unwrap();
        token_store(&dir)
            .save(&Credential::new(
                "saved",
                AuthType::Direct,
                Location::Us,
                "me@example.com",
            ))
            .unwrap();

        let mut sdk = new_sdk(&server, &dir);
        assert!(sdk.is_authenticated());

        sdk.logout().unwrap();
        assert!(!sdk.is_authenticated());
        assert!(!token_path(&dir).exists());

        // Idempotent.
        sdk.logout().unwrap();
    }

    #[tokio::test]
    async fn test_expired_session_detected_lazily() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/userinfo")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"result": 2000, "error": "Log in failed."}"#)
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let err = sdk.user().get_user_info().await.unwrap_err();
        assert_eq!(err.code(), Some(2000));
        assert!(!sdk.is_authenticated());

        let err = sdk.user().get_user_info().await.unwrap_err();
        assert!(matches!(err, PCloudError::Authentication(_)));
        mock.assert_async().await;
    }
}

mod folders {
    use super::*;

    #[tokio::test]
    async fn test_create_folder_error_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/createfolder")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("name".into(), "Docs".into()),
                Matcher::UrlEncoded("folderid".into(), "0".into()),
                Matcher::UrlEncoded("auth".into(), "tok".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"result": 2005, "error": "Directory does not exist."}"#)
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let err = sdk.folder().create("Docs", 0).await.unwrap_err();

        assert!(matches!(err, PCloudError::Api { code: 2005, .. }));
        assert_eq!(err.code(), Some(2005));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_folder_returns_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/createfolder")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"result": 0, "metadata": {"name": "Docs", "isfolder": true, "folderid": 321}}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        assert_eq!(sdk.folder().create("Docs", 0).await.unwrap(), 321);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("GET", "/listfolder")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("Internal Server Error")
            .expect(2)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/listfolder")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"result": 0, "metadata": {"name": "/", "isfolder": true, "folderid": 0,
                    "contents": [{"name": "a.txt", "fileid": 1, "size": 3}]}}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let root = sdk.folder().list_root().await.unwrap();

        assert_eq!(root.contents.len(), 1);
        assert_eq!(root.contents[0].name, "a.txt");
        failing.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_locator_validated_before_any_request() {
        let mut server = Server::new_async().await;
        let any = server
            .mock("GET", Matcher::Any)
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let both = sdk.folder().get_metadata(Some(1), Some("/Docs")).await;
        assert!(matches!(both, Err(PCloudError::InvalidArgument(_))));

        let neither = sdk.folder().get_content(None, None).await;
        assert!(matches!(neither, Err(PCloudError::InvalidArgument(_))));

        let empty_name = sdk.folder().create("  ", 0).await;
        assert!(matches!(empty_name, Err(PCloudError::InvalidArgument(_))));
        any.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_recursive_is_one_call() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/deletefolderrecursive")
            .match_query(Matcher::UrlEncoded("folderid".into(), "55".into()))
            .with_status(200)
            .with_body(r#"{"result": 0, "deletedfiles": 4, "deletedfolders": 2}"#)
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let counts = sdk.folder().delete_recursive(55).await.unwrap();
        assert_eq!(counts.deletedfiles, 4);
        assert_eq!(counts.deletedfolders, 2);
        mock.assert_async().await;
    }
}

mod uploads {
    use super::*;

    #[tokio::test]
    async fn test_chunked_upload_of_25_mib() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("GET", "/upload_create")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"result": 0, "uploadid": 555}"#)
            .expect(1)
            .create_async()
            .await;
        let mut writes = Vec::new();
        for offset in [0, 10 * MIB, 20 * MIB] {
            let write = server
                .mock("PUT", "/upload_write")
                .match_query(Matcher::AllOf(vec![
                    Matcher::UrlEncoded("uploadid".into(), "555".into()),
                    Matcher::UrlEncoded("uploadoffset".into(), offset.to_string()),
                ]))
                .with_status(200)
                .with_body(r#"{"result": 0}"#)
                .expect(1)
                .create_async()
                .await;
            writes.push(write);
        }
        let save = server
            .mock("GET", "/upload_save")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("uploadid".into(), "555".into()),
                Matcher::UrlEncoded("name".into(), "big.bin".into()),
                Matcher::UrlEncoded("folderid".into(), "12".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"result": 0,
                    "metadata": {"name": "big.bin", "fileid": 900, "size": 26214400}}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let single = server
            .mock("POST", "/uploadfile")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![7_u8; 25 * MIB]).unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let mut events: Vec<Event> = Vec::new();
        let mut callback = |bytes: u64, total: u64, pct: f64, _: f64, extras: &ProgressExtras| {
            events.push((bytes, total, pct, extras.status));
        };
        let metadata = sdk
            .file()
            .upload(&path, 12, None, Some(&mut callback))
            .await
            .unwrap();

        assert_eq!(metadata.fileid, Some(900));
        let statuses: Vec<TransferStatus> = events.iter().map(|e| e.3).collect();
        assert_eq!(
            statuses,
            vec![
                TransferStatus::Starting,
                TransferStatus::Progress,
                TransferStatus::Progress,
                TransferStatus::Progress,
                TransferStatus::Saving,
                TransferStatus::Completed,
            ]
        );
        let progress: Vec<u64> = events.iter().skip(1).take(3).map(|e| e.0).collect();
        assert_eq!(
            progress,
            vec![10 * MIB as u64, 20 * MIB as u64, 25 * MIB as u64]
        );
        assert_monotonic(&events);

        let last = events.last().unwrap();
        assert_eq!(last.0, last.1);
        assert_eq!(last.2, 100.0);

        create.assert_async().await;
        for write in &writes {
            write.assert_async().await;
        }
        save.assert_async().await;
        single.assert_async().await;
    }

    #[tokio::test]
    async fn test_small_file_uses_single_request() {
        let mut server = Server::new_async().await;
        let single = server
            .mock("POST", "/uploadfile")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("folderid".into(), "0".into()),
                Matcher::UrlEncoded("filename".into(), "renamed.txt".into()),
                Matcher::UrlEncoded("auth".into(), "tok".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"result": 0, "fileids": [31],
                    "metadata": [{"name": "renamed.txt", "fileid": 31, "size": 5}]}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let create = server
            .mock("GET", "/upload_create")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("small.txt");
        std::fs::write(&path, b"hello").unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let mut events: Vec<Event> = Vec::new();
        let mut callback = |bytes: u64, total: u64, pct: f64, _: f64, extras: &ProgressExtras| {
            events.push((bytes, total, pct, extras.status));
        };
        let metadata = sdk
            .file()
            .upload(&path, 0, Some("renamed.txt"), Some(&mut callback))
            .await
            .unwrap();

        assert_eq!(metadata.fileid, Some(31));
        let last = events.last().unwrap();
        assert_eq!(last.3, TransferStatus::Completed);
        assert_eq!(last.0, 5);
        assert_eq!(last.2, 100.0);
        single.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_chunk_aborts_upload() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/upload_create")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"result": 0, "uploadid": 9}"#)
            .create_async()
            .await;
        let write = server
            .mock("PUT", "/upload_write")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"result": 2008, "error": "User is over quota."}"#)
            .expect(1)
            .create_async()
            .await;
        let save = server
            .mock("GET", "/upload_save")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, vec![1_u8; 3000]).unwrap();
        let config = test_config(&server, &token_path(&dir))
            .with_chunk_size(1024);
        let mut sdk = PCloudSdk::new(config).unwrap();
        sdk.set_access_token("tok", AuthType::Direct, None);

        let mut last: Option<(TransferStatus, Option<String>)> = None;
        let mut callback = |_: u64, _: u64, _: f64, _: f64, extras: &ProgressExtras| {
            last = Some((extras.status, extras.error.clone()));
        };
        let err = sdk
            .file()
            .upload(&path, 0, None, Some(&mut callback))
            .await
            .unwrap_err();

        assert!(matches!(err, PCloudError::Transfer { .. }));
        assert_eq!(err.code(), Some(2008));
        let (status, message) = last.unwrap();
        assert_eq!(status, TransferStatus::Error);
        assert!(message.unwrap().contains("over quota"));
        write.assert_async().await;
        save.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_source_file() {
        let server = Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let err = sdk
            .file()
            .upload(dir.path().join("nope.bin"), 0, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PCloudError::LocalIo { .. }));
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_abort() {
        let mut server = Server::new_async().await;
        let single = server
            .mock("POST", "/uploadfile")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"result": 0, "metadata": [{"name": "x.txt", "fileid": 2, "size": 1}]}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.txt");
        std::fs::write(&path, b"x").unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let mut callback = |_: u64, _: u64, _: f64, _: f64, extras: &ProgressExtras| {
            if extras.status == TransferStatus::Progress {
                panic!("callback bug");
            }
        };
        let metadata = sdk
            .file()
            .upload(&path, 0, None, Some(&mut callback))
            .await
            .unwrap();

        assert_eq!(metadata.fileid, Some(2));
        single.assert_async().await;
    }
}

mod downloads {
    use super::*;

    async fn mock_file(server: &mut ServerGuard, size: usize) -> Vec<mockito::Mock> {
        let host = server.host_with_port();
        mock_file_on(server, size, &host).await
    }

    /// `stat` and `getfilelink` for file 77, with the content served by `host`.
    async fn mock_file_on(
        server: &mut ServerGuard,
        size: usize,
        host: &str,
    ) -> Vec<mockito::Mock> {
        let stat = server
            .mock("GET", "/stat")
            .match_query(Matcher::UrlEncoded("fileid".into(), "77".into()))
            .with_status(200)
            .with_body(format!(
                r#"{{"result": 0, "metadata": {{"name": "photo.jpg", "fileid": 77,
                    "size": {size}}}}}"#
            ))
            .expect(1)
            .create_async()
            .await;
        let link = server
            .mock("GET", "/getfilelink")
            .match_query(Matcher::UrlEncoded("fileid".into(), "77".into()))
            .with_status(200)
            .with_body(format!(
                r#"{{"result": 0, "hosts": ["{host}"], "path": "/dl/photo.jpg"}}"#
            ))
            .expect(1)
            .create_async()
            .await;
        vec![stat, link]
    }

    #[tokio::test]
    async fn test_download_into_directory() {
        let mut server = Server::new_async().await;
        let size = 2 * MIB + 512;
        let mocks = mock_file(&mut server, size).await;
        let body: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let content = server
            .mock("GET", "/dl/photo.jpg")
            .with_status(200)
            .with_body(body.clone())
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let target_dir = dir.path().join("downloads");
        std::fs::create_dir(&target_dir).unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let mut events: Vec<Event> = Vec::new();
        let mut callback = |bytes: u64, total: u64, pct: f64, _: f64, extras: &ProgressExtras| {
            events.push((bytes, total, pct, extras.status));
        };
        let written = sdk
            .file()
            .download(77, &target_dir, Some(&mut callback))
            .await
            .unwrap();

        assert_eq!(written, target_dir.join("photo.jpg"));
        assert_eq!(std::fs::read(&written).unwrap(), body);
        assert_eq!(events.first().unwrap().3, TransferStatus::Starting);
        assert_monotonic(&events);
        let last = events.last().unwrap();
        assert_eq!(last.3, TransferStatus::Completed);
        assert_eq!(last.0, size as u64);
        assert_eq!(last.2, 100.0);

        for mock in &mocks {
            mock.assert_async().await;
        }
        content.assert_async().await;
    }

    #[tokio::test]
    async fn test_download_to_new_file_path() {
        let mut server = Server::new_async().await;
        let _mocks = mock_file(&mut server, 4).await;
        server
            .mock("GET", "/dl/photo.jpg")
            .with_status(200)
            .with_body("abcd")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/deeper/copy.jpg");
        let mut sdk = logged_in_sdk(&server, &dir);

        let written = sdk.file().download(77, &target, None).await.unwrap();

        assert_eq!(written, target);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "abcd");
    }

    #[tokio::test]
    async fn test_failed_link_leaves_no_file() {
        let mut server = Server::new_async().await;
        let _mocks = mock_file(&mut server, 4).await;
        server
            .mock("GET", "/dl/photo.jpg")
            .with_status(404)
            .with_body("gone")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let mut statuses = Vec::new();
        let mut callback = |_: u64, _: u64, _: f64, _: f64, extras: &ProgressExtras| {
            statuses.push(extras.status);
        };
        let err = sdk
            .file()
            .download(77, dir.path(), Some(&mut callback))
            .await
            .unwrap_err();

        assert!(matches!(err, PCloudError::HttpStatus { status: 404, .. }));
        assert_eq!(statuses.last(), Some(&TransferStatus::Error));
        assert!(!dir.path().join("photo.jpg").exists());
    }

    /// Serves one response that promises `promised` bytes, sends `sent` and
    /// hangs up.
    async fn truncating_host(promised: usize, sent: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0_u8; 4096];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\n\
                 Content-Length: {promised}\r\n\r\n"
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&vec![7_u8; sent]).await;
            let _ = socket.shutdown().await;
        });
        addr.to_string()
    }

    #[tokio::test]
    async fn test_interrupted_stream_removes_partial_file() {
        let mut server = Server::new_async().await;
        let host = truncating_host(4 * MIB, 2 * MIB).await;
        let _mocks = mock_file_on(&mut server, 4 * MIB, &host).await;

        let dir = TempDir::new().unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let mut events: Vec<Event> = Vec::new();
        let mut callback = |bytes: u64, total: u64, pct: f64, _: f64, extras: &ProgressExtras| {
            events.push((bytes, total, pct, extras.status));
        };
        let err = sdk
            .file()
            .download(77, dir.path(), Some(&mut callback))
            .await
            .unwrap_err();

        assert!(matches!(err, PCloudError::Transfer { .. }), "got {err:?}");
        assert_eq!(events.first().unwrap().3, TransferStatus::Starting);
        let last = events.last().unwrap();
        assert_eq!(last.3, TransferStatus::Error);
        assert!(last.0 < (4 * MIB) as u64);
        assert_monotonic(&events);
        assert!(!dir.path().join("photo.jpg").exists());
    }
}

mod threading {
    use super::*;

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_transfer_futures_are_send() {
        let server = Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let mut noop = |_: u64, _: u64, _: f64, _: f64, _: &ProgressExtras| {};
        {
            let mut file = sdk.file();
            let upload = file.upload("x", 0, None, Some(&mut noop));
            assert_send(&upload);
        }
        {
            let mut file = sdk.file();
            let download = file.download(1, dir.path(), None);
            assert_send(&download);
        }
    }

    #[tokio::test]
    async fn test_sdk_runs_on_a_spawned_task() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/userinfo")
            .match_query(Matcher::UrlEncoded("auth".into(), "tok".into()))
            .with_status(200)
            .with_body(r#"{"result": 0, "userid": 7, "email": "me@example.com"}"#)
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let mut sdk = logged_in_sdk(&server, &dir);

        let email = tokio::spawn(async move { sdk.user().get_user_email().await })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(email, "me@example.com");
        mock.assert_async().await;
    }
}
