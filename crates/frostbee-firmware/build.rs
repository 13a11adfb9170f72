//! Bakes `FROSTBEE_*` overrides from an optional `.env` file into the binary.
//! Variables already set in the build environment take priority.

const OVERRIDES: [&str; 3] = [
    "FROSTBEE_REPORT_INTERVAL_SECS",
    "FROSTBEE_BATTERY_EMPTY_MV",
    "FROSTBEE_BATTERY_FULL_MV",
];

fn main() {
    load_env_config();

    // make sure linkall.x is the last linker script
    println!("cargo:rustc-link-arg=-Tlinkall.x");
}

fn load_env_config() {
    println!("cargo:rerun-if-changed=.env");
    for key in OVERRIDES {
        println!("cargo:rerun-if-env-changed={key}");
    }

    let Ok(entries) = dotenvy::dotenv_iter() else {
        return;
    };

    for entry in entries {
        match entry {
            Ok((key, value)) if OVERRIDES.contains(&key.as_str()) => {
                if std::env::var_os(&key).is_none() {
                    println!("cargo:rustc-env={key}={}", value.trim());
                }
            }
            Ok((key, _)) => println!("cargo:warning=Ignoring unknown .env key {key}"),
            Err(e) => println!("cargo:warning=Failed to parse .env entry: {e}"),
        }
    }
}
