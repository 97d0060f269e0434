use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "deedbook")]
#[command(about = "Keep a deed register in sync with the hosted table")]
pub struct Cli {
    /// Table to work on; rows without a tag belong to "default"
    #[arg(long, short, global = true, env = "DEEDBOOK_PARTITION")]
    pub partition: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the table
    List,
    /// Append a blank deed and print its id
    Add,
    /// Delete a deed
    Delete { id: String },
    /// Edit one column (deed-type, executed-by, in-favour-of, date, document-number, nature)
    Set {
        id: String,
        field: String,
        value: String,
    },
    /// Edit one extra field (extent, surveyNo, village, or a template field)
    SetExtra {
        id: String,
        key: String,
        value: String,
    },
    /// Copy every deed of another table into this one
    Copy {
        #[arg(long)]
        from: String,
    },
    /// Print the generated preview sentence of a deed
    Preview { id: String },
    /// Print the table whenever it changes, until Ctrl-C
    Watch,
    /// List deed categories and their extra fields
    Templates,
}
