use shared::{
    domain::{Program, BOILTIME_MAX_MINUTES, NAME_MAX_CHARS, NAME_MIN_CHARS},
    error::ApiError,
};
use storage::Storage;

use crate::internal;

/// Runs every structural check plus the name uniqueness lookup and returns
/// all violations found. An empty list means the program is acceptable. The
/// program's own id, if any, is excluded from the uniqueness lookup.
pub async fn validate_program(storage: &Storage, program: &Program) -> Result<Vec<String>, ApiError> {
    let mut errors = check_program(program);

    let available = storage
        .program_name_available(&program.name, program.id)
        .await
        .map_err(internal)?;
    if !available {
        errors.push("A program with the same name already exists".to_string());
    }

    Ok(errors)
}

/// The checks that need nothing but the program itself.
pub fn check_program(program: &Program) -> Vec<String> {
    let mut errors = Vec::new();

    if !name_length_ok(&program.name) {
        errors.push(format!(
            "Name must be between {NAME_MIN_CHARS} and {NAME_MAX_CHARS} characters long"
        ));
    }

    if program.boiltime < 0 || program.boiltime > BOILTIME_MAX_MINUTES {
        errors.push(format!(
            "Boiltime must be between 0 and {BOILTIME_MAX_MINUTES} minutes"
        ));
    }

    if program.starttemp >= program.endtemp {
        errors.push("Start temperature must be smaller than end temperature".to_string());
    }

    if !program.nomash {
        check_mash_steps(program, &mut errors);
    }

    if !program.noboil {
        check_hops(program, &mut errors);
    }

    errors
}

// Each step is bracketed by its neighbours, with the program's start and end
// temperatures standing in at either end. Steps are checked in the order
// given; nothing is sorted.
fn check_mash_steps(program: &Program, errors: &mut Vec<String>) {
    let steps = &program.mashsteps;
    for (i, step) in steps.iter().enumerate() {
        let mintemp = if i == 0 {
            program.starttemp
        } else {
            steps[i - 1].temp
        };
        let maxtemp = steps.get(i + 1).map_or(program.endtemp, |next| next.temp);

        if step.temp < mintemp || step.temp > maxtemp {
            errors.push(format!(
                "Mash step {i} temperature {} is out of line",
                step.temp
            ));
        }
        if step.order != i as i64 {
            errors.push(format!(
                "Mash step order out of place: {} != {i}",
                step.order
            ));
        }
    }
}

fn check_hops(program: &Program, errors: &mut Vec<String>) {
    for hop in &program.hops {
        if hop.attime < 0 || hop.attime > program.boiltime {
            errors.push(format!(
                "Hop '{}' timing must be between 0 and the boil time",
                hop.name
            ));
        }
        if hop.quantity <= 0.0 {
            errors.push(format!("Hop '{}' quantity must be positive", hop.name));
        }
        if !name_length_ok(&hop.name) {
            errors.push(format!(
                "Hop names must be between {NAME_MIN_CHARS} and {NAME_MAX_CHARS} characters"
            ));
        }
    }
}

fn name_length_ok(name: &str) -> bool {
    (NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&name.chars().count())
}
