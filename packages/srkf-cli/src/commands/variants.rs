use crate::cli::VariantsArgs;
use crate::exit_codes;
use crate::output;
use srkf_rs::VariantMetadata;

pub fn execute(args: VariantsArgs) -> i32 {
    let variants = VariantMetadata::registry();

    if args.json {
        if let Err(code) = output::print_json(&variants) {
            return code;
        }
    } else {
        println!("Available filter variants:\n");
        println!("  {:<4} {:<24} {:<10} {:<14}", "Pos", "Name", "Update", "Kernel");
        println!("  {}", "-".repeat(54));
        for v in &variants {
            println!(
                "  {:<4} {:<24} {:<10} {:<14}",
                v.position,
                v.name,
                v.rule.as_str(),
                v.kernel.as_str()
            );
        }
        println!();
        println!("Name format: <Update>_<Kernel>, matched case-insensitively");
        println!("Example: --variant Bierman_Householder");
    }

    exit_codes::SUCCESS
}
