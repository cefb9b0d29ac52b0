use clap::{Parser, Subcommand};

/// Runs a school election from the command line: posts, candidates, voters,
/// ballots, results and analytics.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON file that holds the election. Created by `init`.
    #[clap(short, long, value_parser, global = true, default_value = "election.json")]
    pub store: String,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Creates an empty store.
    Init,
    /// Adds a post and prints its id.
    AddPost {
        #[clap(long, value_parser)]
        title: String,
        #[clap(long, value_parser, default_value = "")]
        description: String,
    },
    /// Deletes a post and all its candidates.
    DeletePost {
        #[clap(value_parser)]
        id: String,
    },
    /// Adds a candidate to a post and prints its id.
    AddCandidate {
        /// The id of the post.
        #[clap(long, value_parser)]
        post: String,
        #[clap(long, value_parser)]
        name: String,
        #[clap(long, value_parser, default_value = "")]
        slogan: String,
        /// (url) A picture of the candidate.
        #[clap(long, value_parser)]
        image: Option<String>,
        #[clap(long, value_parser)]
        bio: Option<String>,
    },
    DeleteCandidate {
        #[clap(value_parser)]
        id: String,
    },
    /// Registers a voter and prints its id.
    AddVoter {
        #[clap(long, value_parser)]
        name: String,
        #[clap(long, value_parser)]
        student_code: String,
        #[clap(long, value_parser)]
        password: String,
    },
    DeleteVoter {
        #[clap(value_parser)]
        id: String,
    },
    /// Casts the ballot of a voter and prints its id.
    Vote {
        #[clap(long, value_parser)]
        student_code: String,
        #[clap(long, value_parser)]
        password: String,
        /// (POST=CANDIDATE, repeated) The candidate selected for a post. At most one per post.
        #[clap(long = "select", value_parser, required = true)]
        selections: Vec<String>,
    },
    /// Deletes all the ballots. Every voter may vote again.
    ResetVotes {
        /// Confirms the reset.
        #[clap(long, takes_value = false)]
        yes: bool,
    },
    /// Prints the posts, the candidates and the voters.
    List,
    /// Tallies the ballots.
    Results {
        /// (file path, 'stdout' or empty) Where the results are written in JSON format.
        #[clap(short, long, value_parser)]
        out: Option<String>,
        /// (file path) A reference file containing earlier results in JSON format. If provided, votetally
        /// will check that the tallied output matches the reference.
        #[clap(short, long, value_parser)]
        reference: Option<String>,
    },
    /// Computes turnout, margins, rankings and insights.
    Analytics {
        /// (file path, 'stdout' or empty) Where the report is written in JSON format.
        #[clap(short, long, value_parser)]
        out: Option<String>,
        /// The number of candidates in the rankings.
        #[clap(long, value_parser, default_value_t = vote_tally::analytics::DEFAULT_RANKING_LIMIT)]
        top: usize,
    },
}
