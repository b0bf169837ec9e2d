use strata_db::{MigrationStep, Result, ThresholdSource};

const CREATE_PERSON: &str = "
    CREATE TABLE person
    ( id INTEGER NOT NULL PRIMARY KEY
    , name TEXT NOT NULL
    );
";

/// SQLite can't add a column with a non-constant default, so the table is
/// rebuilt to gain `created`.
const ADD_PERSON_CREATED: &str = "
    CREATE TABLE new_person
    ( id INTEGER NOT NULL PRIMARY KEY
    , name TEXT NOT NULL
    , created TEXT NOT NULL DEFAULT (date('now'))
    );

    INSERT INTO new_person
    SELECT id, name, date('now') AS created
      FROM person;

    DROP TABLE person;

    ALTER TABLE new_person
    RENAME TO person;
";

const ADD_PERSON_SSN: &str = "
    ALTER TABLE person
    ADD COLUMN ssn TEXT NULL;
";

const UNIQUE_PERSON_SSN: &str = "
    CREATE UNIQUE INDEX ssn_uq_idx
    ON person (ssn)
    WHERE (ssn IS NOT NULL);
";

/// The application's schema history. Append new steps; never edit shipped ones.
pub fn person_catalog() -> Result<ThresholdSource> {
    ThresholdSource::new()
        .step(1, MigrationStep::batch(CREATE_PERSON)?)?
        .step(2, MigrationStep::batch(ADD_PERSON_CREATED)?)?
        .step(3, MigrationStep::batch(ADD_PERSON_SSN)?)?
        .step(4, MigrationStep::batch(UNIQUE_PERSON_SSN)?)
}
