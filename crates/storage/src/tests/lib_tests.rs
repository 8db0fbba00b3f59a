use super::*;

fn pale_ale() -> Program {
    Program {
        id: None,
        name: "Pale Ale".into(),
        starttemp: 40.0,
        endtemp: 78.0,
        boiltime: 60,
        nomash: false,
        noboil: false,
        mashsteps: vec![
            MashStep {
                order: 0,
                temp: 52.0,
                holdtime: 15,
            },
            MashStep {
                order: 1,
                temp: 66.0,
                holdtime: 60,
            },
            MashStep {
                order: 2,
                temp: 72.0,
                holdtime: 10,
            },
        ],
        hops: vec![
            HopAddition {
                attime: 60,
                quantity: 20.0,
                name: "Magnum".into(),
            },
            HopAddition {
                attime: 10,
                quantity: 30.0,
                name: "Cascade".into(),
            },
            HopAddition {
                attime: 45,
                quantity: 12.5,
                name: "Centennial".into(),
            },
        ],
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("aegir.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn stored_program_reads_back_in_submitted_order() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let program = pale_ale();
    let id = storage.create_program(&program).await.expect("create");

    let fetched = storage
        .get_program(id)
        .await
        .expect("get")
        .expect("program exists");
    assert_eq!(fetched.id, Some(id));
    assert_eq!(fetched.mashsteps, program.mashsteps);
    assert_eq!(fetched.hops, program.hops);
    assert_eq!(fetched.boiltime, 60);
    assert!(!fetched.nomash);
}

#[tokio::test]
async fn lists_programs_by_name() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let mut stout = pale_ale();
    stout.name = "Stout".into();
    storage.create_program(&stout).await.expect("stout");
    storage.create_program(&pale_ale()).await.expect("pale");

    let names: Vec<String> = storage
        .list_programs()
        .await
        .expect("list")
        .into_iter()
        .map(|summary| summary.name)
        .collect();
    assert_eq!(names, vec!["Pale Ale".to_string(), "Stout".to_string()]);
}

#[tokio::test]
async fn name_availability_ignores_own_id() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let id = storage.create_program(&pale_ale()).await.expect("create");

    assert!(!storage
        .program_name_available("Pale Ale", None)
        .await
        .expect("lookup"));
    assert!(storage
        .program_name_available("Pale Ale", Some(id))
        .await
        .expect("lookup"));
    assert!(storage
        .program_name_available("Porter", None)
        .await
        .expect("lookup"));
}

#[tokio::test]
async fn update_replaces_children() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let id = storage.create_program(&pale_ale()).await.expect("create");

    let mut revised = pale_ale();
    revised.name = "Pale Ale v2".into();
    revised.mashsteps.truncate(1);
    revised.hops = vec![HopAddition {
        attime: 5,
        quantity: 40.0,
        name: "Citra".into(),
    }];
    assert!(storage.update_program(id, &revised).await.expect("update"));

    let fetched = storage.get_program(id).await.expect("get").expect("exists");
    assert_eq!(fetched.name, "Pale Ale v2");
    assert_eq!(fetched.mashsteps, revised.mashsteps);
    assert_eq!(fetched.hops, revised.hops);
}

#[tokio::test]
async fn update_of_missing_program_reports_false() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let updated = storage
        .update_program(ProgramId(404), &pale_ale())
        .await
        .expect("update");
    assert!(!updated);
}

#[tokio::test]
async fn delete_removes_program_and_children() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let id = storage.create_program(&pale_ale()).await.expect("create");

    assert!(storage.delete_program(id).await.expect("delete"));
    assert!(storage.get_program(id).await.expect("get").is_none());
    assert!(!storage.delete_program(id).await.expect("second delete"));

    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hops")
        .fetch_one(storage.pool())
        .await
        .expect("count");
    assert_eq!(orphans, 0);
}
