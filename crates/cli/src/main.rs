use std::path::PathBuf;

use clap::{Parser, Subcommand};
use medipass_core::store::fs::FsStore;
use medipass_core::store::AccessRequestStore;
use medipass_core::{codec, AccessRequest};
use medipass_ids::{DoctorRef, PatientRef, RefId};

#[derive(Parser)]
#[command(name = "medipass")]
#[command(about = "MediPass access-grant system CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint a fresh canonical reference
    MintRef,
    /// Encode a patient reference into its scannable code
    Encode {
        /// Canonical patient reference (32 lowercase hex characters)
        patient_ref: String,
    },
    /// Decode a scanned code back into a patient reference
    Decode {
        /// The scanned code text
        code: String,
    },
    /// List access requests stored under a data directory
    ListRequests {
        /// Root data directory of a file-backed store
        #[arg(long, default_value = "/medipass_data")]
        data_dir: PathBuf,
        /// Only requests concerning this patient
        #[arg(long)]
        patient: Option<String>,
        /// Only requests sent by this doctor
        #[arg(long)]
        doctor: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::MintRef) => {
            println!("{}", RefId::generate());
        }
        Some(Commands::Encode { patient_ref }) => {
            let patient = PatientRef::parse(&patient_ref)?;
            println!("{}", codec::encode(&patient));
        }
        Some(Commands::Decode { code }) => match codec::decode(&code) {
            Ok(patient) => println!("{patient}"),
            Err(e) => eprintln!("Decode failed: {e}"),
        },
        Some(Commands::ListRequests {
            data_dir,
            patient,
            doctor,
        }) => {
            let store = FsStore::open(&data_dir)?;
            let requests = match (patient, doctor) {
                (Some(patient), _) => {
                    store.list_for_patient(&PatientRef::parse(&patient)?)?
                }
                (None, Some(doctor)) => {
                    store.list_for_doctor(&DoctorRef::parse(&doctor)?)?
                }
                (None, None) => {
                    eprintln!("Provide --patient or --doctor");
                    return Ok(());
                }
            };

            if requests.is_empty() {
                println!("No access requests found.");
            } else {
                for request in requests {
                    print_request(&request);
                }
            }
        }
        None => {
            println!("Run with --help for available commands.");
        }
    }

    Ok(())
}

fn print_request(request: &AccessRequest) {
    println!(
        "ID: {}, Patient: {}, Doctor: {}, Status: {}, Requested: {}",
        request.id,
        request.patient_ref,
        request.doctor_ref,
        request.status,
        request.requested_at.format("%Y-%m-%d %H:%M:%S"),
    );
}
