//! Main whole body controller executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the controller and any configured Cartesian goals
//!     - Main loop:
//!         - Joint state acquisition (looped back from the previous cycle's
//!           references until real drivers are attached)
//!         - Whole body controller processing
//!         - Status archiving on the 1Hz cycle
//!         - Cycle management
//!
//! # Modules
//!
//! All modules (e.g. `wbc`) shall meet the following requirements:
//!     1. Provide a public struct implementing the `util::module::State` trait.
//!

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, info, warn};
use std::thread;

// Internal
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    session::{self, Session},
};
use wbc_lib::{
    cycle::{CycleEnd, CycleManager},
    data_store::DataStore,
    params::WbcExecParams,
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("wbc_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Whole Body Controller Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: WbcExecParams =
        util::params::load("wbc_exec.toml").wrap_err("Could not load exec params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut ds = DataStore::default();

    ds.wbc
        .init("wbc.toml", &session)
        .wrap_err("Failed to initialise the WholeBodyController")?;
    info!("WholeBodyController init complete");

    for goal in exec_params.goals.iter() {
        let handle = ds
            .wbc
            .add_motion_objective(Box::new(goal.to_objective()))
            .wrap_err_with(|| format!("Failed to add the goal for {}", goal.tip))?;
        info!(
            "Cartesian goal {} -> {} added as {}",
            goal.root, goal.tip, handle
        );
    }

    info!("Module initialisation complete\n");

    let mut cycle_mgr = CycleManager::new(ds.wbc.params().cycle_period_s)
        .wrap_err("Invalid controller cycle period")?;

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    loop {
        cycle_mgr.start();

        // Clear items that need wiping at the start of the cycle
        ds.cycle_start(&cycle_mgr);

        // ---- DATA INPUT ----

        ds.wbc_input.measurements = ds.loopback_feedback(&exec_params.initial_positions);

        // ---- CONTROL ALGORITHM PROCESSING ----

        match ds.wbc.proc(&ds.wbc_input) {
            Ok((o, r)) => {
                debug!("WBC cost: {:.4}", r.total_cost);
                ds.wbc_output = Some(o);
                ds.wbc_status_rpt = r;
            }
            Err(e) => {
                // Bad measurements only affect this cycle, keep the previous
                // output and continue
                warn!("Error during WholeBodyController processing: {}", e)
            }
        };

        // ---- WRITE ARCHIVES ----

        if ds.is_1_hz_cycle {
            session::save_with_timestamp("arch/wbc_status_report.json", ds.wbc_status_rpt.clone());

            if let Some(ref o) = ds.wbc_output {
                session::save_with_timestamp("arch/wbc_output.json", o.clone());
            }
        }

        // ---- CYCLE MANAGEMENT ----

        match cycle_mgr.end() {
            CycleEnd::OnTime(d) => thread::sleep(d),
            CycleEnd::Overrun(_) => (),
        }

        if let Some(max) = exec_params.max_cycles {
            if cycle_mgr.num_cycles() >= max as u128 {
                info!("Reached the maximum of {} cycles, stopping", max);
                break;
            }
        }
    }

    // ---- SHUTDOWN ----

    info!(
        "{} cycles executed, {} overruns",
        cycle_mgr.num_cycles(),
        cycle_mgr.total_overruns()
    );

    session.exit();

    info!("End of execution");

    Ok(())
}
