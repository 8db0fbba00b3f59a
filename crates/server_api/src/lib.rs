use command_channel::SharedChannel;
use shared::{
    domain::{Program, ProgramId, ProgramSummary},
    error::{ApiError, ErrorCode},
};
use storage::Storage;
use tracing::info;

pub mod dispatch;
pub mod gateway;
pub mod schedule;
pub mod validation;

pub use dispatch::LoadProgramRequest;
pub use schedule::{resolve_schedule, StartAt};
pub use validation::{check_program, validate_program};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub brewd: SharedChannel,
}

pub async fn list_programs(ctx: &ApiContext) -> Result<Vec<ProgramSummary>, ApiError> {
    ctx.storage.list_programs().await.map_err(internal)
}

pub async fn get_program(ctx: &ApiContext, id: ProgramId) -> Result<Program, ApiError> {
    ctx.storage
        .get_program(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| program_not_found(id))
}

/// Stores a new program. Any id carried by the input is ignored.
pub async fn create_program(ctx: &ApiContext, mut program: Program) -> Result<ProgramId, ApiError> {
    program.id = None;
    program.normalize();

    let errors = validate_program(&ctx.storage, &program).await?;
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let id = ctx.storage.create_program(&program).await.map_err(internal)?;
    info!(program_id = id.0, name = %program.name, "program created");
    Ok(id)
}

/// Replaces an existing program, children included.
pub async fn update_program(
    ctx: &ApiContext,
    id: ProgramId,
    mut program: Program,
) -> Result<(), ApiError> {
    program.id = Some(id);
    program.normalize();

    let errors = validate_program(&ctx.storage, &program).await?;
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let updated = ctx
        .storage
        .update_program(id, &program)
        .await
        .map_err(internal)?;
    if !updated {
        return Err(program_not_found(id));
    }
    info!(program_id = id.0, "program updated");
    Ok(())
}

pub async fn delete_program(ctx: &ApiContext, id: ProgramId) -> Result<(), ApiError> {
    let deleted = ctx.storage.delete_program(id).await.map_err(internal)?;
    if !deleted {
        return Err(program_not_found(id));
    }
    info!(program_id = id.0, "program deleted");
    Ok(())
}

pub(crate) fn program_not_found(id: ProgramId) -> ApiError {
    ApiError::new(ErrorCode::NotFound, format!("Program {} not found", id.0))
}

pub(crate) fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_channel::ChannelConfig;
    use shared::domain::{HopAddition, MashStep};

    async fn setup() -> ApiContext {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        // Nothing listens here; program operations never touch brewd.
        let brewd = SharedChannel::tcp(&ChannelConfig::new("127.0.0.1:9"));
        ApiContext { storage, brewd }
    }

    fn program(name: &str) -> Program {
        Program {
            id: None,
            name: name.into(),
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
            ],
            hops: vec![HopAddition {
                attime: 60,
                quantity: 25.0,
                name: "Magnum".into(),
            }],
        }
    }

    #[tokio::test]
    async fn created_program_reads_back() {
        let ctx = setup().await;
        let id = create_program(&ctx, program("Pale Ale")).await.expect("create");

        let stored = get_program(&ctx, id).await.expect("get");
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.name, "Pale Ale");
        assert_eq!(stored.mashsteps, program("x").mashsteps);
        assert_eq!(stored.hops, program("x").hops);
    }

    #[tokio::test]
    async fn duplicate_name_is_a_validation_error() {
        let ctx = setup().await;
        create_program(&ctx, program("Stout")).await.expect("first");

        let err = create_program(&ctx, program("Stout"))
            .await
            .expect_err("duplicate");
        assert_eq!(err.code, ErrorCode::Validation);
        assert_eq!(
            err.errors,
            vec!["A program with the same name already exists".to_string()]
        );
    }

    #[tokio::test]
    async fn all_violations_are_reported_together() {
        let ctx = setup().await;
        create_program(&ctx, program("Dup")).await.expect("first");

        let mut bad = program("Dup");
        bad.boiltime = 400;
        bad.starttemp = 99.0;
        let err = create_program(&ctx, bad).await.expect_err("invalid");
        assert_eq!(err.code, ErrorCode::Validation);
        assert!(err.errors.len() >= 3, "{:?}", err.errors);
        assert!(err.errors.iter().any(|e| e.contains("same name")));
        assert!(list_programs(&ctx).await.expect("list").len() == 1);
    }

    #[tokio::test]
    async fn update_may_keep_its_own_name() {
        let ctx = setup().await;
        let id = create_program(&ctx, program("Porter")).await.expect("create");

        let mut changed = program("Porter");
        changed.boiltime = 90;
        changed.hops[0].attime = 80;
        update_program(&ctx, id, changed).await.expect("update");

        let stored = get_program(&ctx, id).await.expect("get");
        assert_eq!(stored.boiltime, 90);
        assert_eq!(stored.hops[0].attime, 80);
    }

    #[tokio::test]
    async fn update_cannot_take_another_programs_name() {
        let ctx = setup().await;
        create_program(&ctx, program("Bock")).await.expect("bock");
        let id = create_program(&ctx, program("Dunkel")).await.expect("dunkel");

        let err = update_program(&ctx, id, program("Bock"))
            .await
            .expect_err("taken");
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[tokio::test]
    async fn skipped_phases_drop_their_children() {
        let ctx = setup().await;
        let mut p = program("Extract Brew");
        p.nomash = true;
        p.noboil = true;
        let id = create_program(&ctx, p).await.expect("create");

        let stored = get_program(&ctx, id).await.expect("get");
        assert!(stored.mashsteps.is_empty());
        assert!(stored.hops.is_empty());
    }

    #[tokio::test]
    async fn missing_program_is_not_found() {
        let ctx = setup().await;
        let missing = ProgramId(4242);

        assert_eq!(
            get_program(&ctx, missing).await.expect_err("get").code,
            ErrorCode::NotFound
        );
        assert_eq!(
            update_program(&ctx, missing, program("Ghost"))
                .await
                .expect_err("update")
                .code,
            ErrorCode::NotFound
        );
        assert_eq!(
            delete_program(&ctx, missing).await.expect_err("delete").code,
            ErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn deleted_program_disappears_from_listing() {
        let ctx = setup().await;
        let id = create_program(&ctx, program("Kolsch")).await.expect("create");
        delete_program(&ctx, id).await.expect("delete");
        assert!(list_programs(&ctx).await.expect("list").is_empty());
    }
}
